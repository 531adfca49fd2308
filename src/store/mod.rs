//! Remote label store subsystem.
//!
//! # Data Flow
//! ```text
//! RetryEngine / ServiceRegistration
//!     → PatchStore::apply_patches (one JSON-patch request per batch)
//!     → kube.rs (Kubernetes API over HTTPS, bearer token)
//!       or memory.rs (in-process fake)
//! ```
//!
//! # Design Decisions
//! - Client settings are passed in explicitly, never read from globals
//! - A missing pod is its own error variant; callers decide what it means
//! - Request timeouts belong to the store, not to the retry engine

pub mod kube;
pub mod memory;
pub mod types;

use async_trait::async_trait;

use crate::patch::Patch;

pub use kube::KubeClient;
pub use memory::InMemoryStore;
pub use types::{ObjectMeta, Pod, ResourceRef, StoreError, StoreResult};

/// Remote store that holds the pod's labels.
#[async_trait]
pub trait PatchStore: Send + Sync {
    /// Apply all patches as one request. Fails as a unit.
    async fn apply_patches(&self, target: &ResourceRef, patches: &[Patch]) -> StoreResult<()>;

    /// Read the pod. Only used outside the retry loop.
    async fn fetch_pod(&self, target: &ResourceRef) -> StoreResult<Pod>;
}
