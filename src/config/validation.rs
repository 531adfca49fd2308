//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the pod coordinates are present
//! - Validate value ranges (interval > 0, timeout > 0, capacity >= 1)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RegistrarConfig → Result<(), Vec<ValidationError>>

use std::fmt;

use crate::config::schema::RegistrarConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingField(&'static str),
    InvalidScheme(String),
    ZeroValue(&'static str),
    InvalidAddress { field: &'static str, value: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingField(field) => write!(f, "{} must be set", field),
            ValidationError::InvalidScheme(s) => {
                write!(f, "kubernetes.scheme must be http or https, got {:?}", s)
            }
            ValidationError::ZeroValue(field) => write!(f, "{} must be greater than zero", field),
            ValidationError::InvalidAddress { field, value } => {
                write!(f, "{} is not a valid address: {:?}", field, value)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &RegistrarConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let kube = &config.kubernetes;

    if kube.namespace.trim().is_empty() {
        errors.push(ValidationError::MissingField("kubernetes.namespace"));
    }
    if kube.pod_name.trim().is_empty() {
        errors.push(ValidationError::MissingField("kubernetes.pod_name"));
    }
    if kube.service_host.trim().is_empty() {
        errors.push(ValidationError::MissingField("kubernetes.service_host"));
    }
    if kube.scheme != "http" && kube.scheme != "https" {
        errors.push(ValidationError::InvalidScheme(kube.scheme.clone()));
    }
    if kube.service_port == 0 {
        errors.push(ValidationError::ZeroValue("kubernetes.service_port"));
    }
    if kube.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroValue("kubernetes.request_timeout_secs"));
    }

    if config.retry.interval_ms == 0 {
        errors.push(ValidationError::ZeroValue("retry.interval_ms"));
    }
    if config.retry.max_pending == 0 {
        errors.push(ValidationError::ZeroValue("retry.max_pending"));
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: obs.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
