//! Pod label registration subsystem.
//!
//! # Data Flow
//! ```text
//! State hooks (notify_*_state_change)
//!     → service.rs (label → Replace patch)
//!     → retry.rs (coalesce into pending set, no I/O)
//!     → periodic flush → PatchStore
//!
//! Startup: fetch pod → initial labels in one batch → spawn retry loop
//! Shutdown: wait for in-flight flush → final labels → join
//! ```

pub mod labels;
pub mod retry;
pub mod service;

pub use retry::{RetryEngine, DEFAULT_RETRY_INTERVAL};
pub use service::{RegistrationError, RegistrationState, ServiceRegistration};
