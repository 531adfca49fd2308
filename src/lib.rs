//! Pod label registrar library.
//!
//! Mirrors a process's operational state (sealed, active, initialized,
//! performance standby, version) onto its Kubernetes pod's labels and keeps
//! them eventually consistent through a coalescing retry loop.

pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod patch;
pub mod registration;
pub mod store;

pub use config::RegistrarConfig;
pub use lifecycle::Shutdown;
pub use patch::{Operation, Patch, PatchError};
pub use registration::{RegistrationState, RetryEngine, ServiceRegistration};
pub use store::{KubeClient, PatchStore, ResourceRef, StoreError};
