//! Well-known pod labels.

use crate::patch::{Operation, Patch};

/// JSON pointer to the pod's labels map.
pub const PATH_TO_LABELS: &str = "/metadata/labels";

pub const LABEL_VAULT_VERSION: &str = "vault-version";
pub const LABEL_ACTIVE: &str = "vault-active";
pub const LABEL_SEALED: &str = "vault-sealed";
pub const LABEL_PERF_STANDBY: &str = "vault-perf-standby";
pub const LABEL_INITIALIZED: &str = "vault-initialized";

/// Labels whose value is a boolean and that go through the retry engine.
pub const BOOLEAN_LABELS: [&str; 4] = [LABEL_ACTIVE, LABEL_SEALED, LABEL_PERF_STANDBY, LABEL_INITIALIZED];

/// JSON pointer for one label. Label keys never contain `/` or `~` here.
pub fn label_path(label: &str) -> String {
    format!("{}/{}", PATH_TO_LABELS, label)
}

pub fn bool_patch(operation: Operation, label: &str, value: bool) -> Patch {
    Patch::boolean(operation, label_path(label), value)
}
