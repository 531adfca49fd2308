//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → verify pod → apply initial labels → spawn background tasks
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → tasks leave their loops → join
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - In-flight API calls are not aborted; shutdown waits for them

pub mod shutdown;
pub mod signals;

pub use shutdown::{BackgroundTasks, Shutdown};
