//! Store-side types and error definitions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coordinates of the pod whose labels are maintained.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The subset of a Kubernetes pod this crate reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub metadata: ObjectMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

/// Errors that can occur talking to the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The pod does not exist.
    #[error("pod {0} not found")]
    NotFound(ResourceRef),

    /// Connection, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API rejected our credentials.
    #[error("unauthorized: API returned {0}")]
    Unauthorized(u16),

    /// Any other non-success status.
    #[error("API returned {code}: {body}")]
    Status { code: u16, body: String },

    /// Service account token or CA bundle could not be read.
    #[error("credentials unavailable at {path}: {source}")]
    Credentials {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Response body did not decode.
    #[error("unable to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Injected or otherwise unclassified failure.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::Transport(_) => "transport",
            StoreError::Unauthorized(_) => "unauthorized",
            StoreError::Status { .. } => "status",
            StoreError::Credentials { .. } => "credentials",
            StoreError::Decode(_) => "decode",
            StoreError::Unavailable(_) => "unavailable",
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
