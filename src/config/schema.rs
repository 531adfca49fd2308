//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the registrar.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::ResourceRef;

/// Root configuration for the registrar.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RegistrarConfig {
    /// Kubernetes API coordinates and credentials.
    pub kubernetes: KubernetesConfig,

    /// Retry loop settings.
    pub retry: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Kubernetes API client configuration.
///
/// Passed to [`crate::store::KubeClient::new`]; nothing here is read from
/// process-wide state once the config is loaded.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KubernetesConfig {
    /// Namespace of the pod to label.
    pub namespace: String,

    /// Name of the pod to label.
    pub pod_name: String,

    /// `https` in cluster, `http` for local fakes.
    pub scheme: String,

    /// API server host (usually from `KUBERNETES_SERVICE_HOST`).
    pub service_host: String,

    /// API server port (usually from `KUBERNETES_SERVICE_PORT`).
    pub service_port: u16,

    /// Service account token, re-read on every request.
    pub token_file: String,

    /// Cluster CA bundle (PEM).
    pub root_ca_file: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            pod_name: String::new(),
            scheme: "https".to_string(),
            service_host: String::new(),
            service_port: 443,
            token_file: "/var/run/secrets/kubernetes.io/serviceaccount/token".to_string(),
            root_ca_file: "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl KubernetesConfig {
    /// The pod this process registers itself on.
    pub fn target(&self) -> ResourceRef {
        ResourceRef::new(&self.namespace, &self.pod_name)
    }

    /// Base URL of the API server.
    pub fn base_url(&self) -> Result<url::Url, url::ParseError> {
        url::Url::parse(&format!(
            "{}://{}:{}",
            self.scheme, self.service_host, self.service_port
        ))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Retry loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Fixed period between flush attempts in milliseconds.
    pub interval_ms: u64,

    /// Maximum number of distinct label paths pending at once.
    pub max_pending: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            max_pending: 4,
        }
    }
}

impl RetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Enable Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "pod_registrar=info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9102".to_string(),
        }
    }
}
