//! Label patches and the coalescing pending set.
//!
//! # Data Flow
//! ```text
//! notify(Patch)
//!     → types.rs (operation, path, boolean value check)
//!     → pending.rs (one slot per path, exact reversal cancels)
//!     → snapshot taken by the retry engine on each tick
//! ```
//!
//! # Design Decisions
//! - Paths are the coalescing key; the operation is not
//! - Values fed to the pending set are boolean strings only
//! - Capacity is explicit and checked, inserts past it are rejected

pub mod pending;
pub mod types;

pub use pending::{Coalesced, PendingSet};
pub use types::{Operation, Patch, PatchError};
