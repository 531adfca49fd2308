//! Patch and operation types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON-patch operation applied at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Replace,
    Remove,
}

/// A single intended mutation of the pod's labels.
///
/// Serializes to one JSON-patch entry: `{"op": "...", "path": "...", "value": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    #[serde(rename = "op")]
    pub operation: Operation,
    pub path: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub value: serde_json::Value,
}

impl Patch {
    /// Build a patch carrying a string value.
    pub fn new(operation: Operation, path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            operation,
            path: path.into(),
            value: serde_json::Value::String(value.into()),
        }
    }

    /// Build a patch carrying a boolean encoded as `"true"` / `"false"`.
    pub fn boolean(operation: Operation, path: impl Into<String>, value: bool) -> Self {
        Self::new(operation, path, bool_to_label(value))
    }

    /// Build a patch with an arbitrary JSON value (e.g. an empty labels map).
    pub fn with_json(operation: Operation, path: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            operation,
            path: path.into(),
            value,
        }
    }

    /// Parse the value as a boolean label.
    pub fn bool_value(&self) -> Result<bool, PatchError> {
        match self.value.as_str() {
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            _ => Err(PatchError::MalformedValue {
                path: self.path.clone(),
                value: self.value.to_string(),
            }),
        }
    }
}

/// Encode a boolean the way labels carry it.
pub fn bool_to_label(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Errors surfaced synchronously to a notifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    /// The patch value is not the literal string `"true"` or `"false"`.
    #[error("patch for {path} must carry a boolean string value, got {value}")]
    MalformedValue { path: String, value: String },

    /// A new path was notified while every pending slot is taken.
    #[error("pending set is full ({capacity} paths), cannot queue {path}")]
    PendingSetFull { path: String, capacity: usize },
}
