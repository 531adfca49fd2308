//! Kubernetes API client for pod labels.
//!
//! # Responsibilities
//! - Read a pod (`GET /api/v1/namespaces/{ns}/pods/{name}`)
//! - Apply JSON patches to it (`PATCH`, `application/json-patch+json`)
//! - Authenticate with the mounted service account token
//! - Map API statuses onto [`StoreError`]

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use url::Url;

use crate::config::KubernetesConfig;
use crate::patch::Patch;
use crate::store::types::{Pod, ResourceRef, StoreError, StoreResult};
use crate::store::PatchStore;

const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

/// Pod label client backed by `reqwest`.
#[derive(Clone)]
pub struct KubeClient {
    http: reqwest::Client,
    base_url: Url,
    token_file: PathBuf,
}

impl KubeClient {
    /// Build a client from explicit settings.
    ///
    /// With `https`, the cluster CA is loaded here so a missing bundle fails
    /// at startup rather than on the first request.
    pub fn new(config: &KubernetesConfig) -> StoreResult<Self> {
        let base_url = config.base_url().map_err(|e| {
            StoreError::Unavailable(format!(
                "invalid API address {}:{}: {}",
                config.service_host, config.service_port, e
            ))
        })?;

        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("pod-registrar/", env!("CARGO_PKG_VERSION")));

        if config.scheme == "https" {
            let pem = std::fs::read(&config.root_ca_file).map_err(|source| StoreError::Credentials {
                path: config.root_ca_file.clone(),
                source,
            })?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        let client = Self {
            http: builder.build()?,
            base_url,
            token_file: PathBuf::from(&config.token_file),
        };

        tracing::debug!(api = %client.base_url, "Kubernetes client initialized");
        Ok(client)
    }

    fn pod_url(&self, target: &ResourceRef) -> StoreResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Unavailable(format!("API address {} cannot be a base", self.base_url)))?
            .clear()
            .extend(["api", "v1", "namespaces", target.namespace.as_str(), "pods", target.name.as_str()]);
        Ok(url)
    }

    // Tokens are rotated by the kubelet, so read the file every time.
    async fn bearer_token(&self) -> StoreResult<String> {
        let token = tokio::fs::read_to_string(&self.token_file)
            .await
            .map_err(|source| StoreError::Credentials {
                path: self.token_file.display().to_string(),
                source,
            })?;
        Ok(token.trim().to_string())
    }

    async fn check_status(response: reqwest::Response, target: &ResourceRef) -> StoreResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(target.clone())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(StoreError::Unauthorized(status.as_u16()))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::Status {
                    code: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[async_trait]
impl PatchStore for KubeClient {
    async fn apply_patches(&self, target: &ResourceRef, patches: &[Patch]) -> StoreResult<()> {
        let url = self.pod_url(target)?;
        let body = serde_json::to_vec(patches)?;
        let token = self.bearer_token().await?;

        let response = self
            .http
            .patch(url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, JSON_PATCH_CONTENT_TYPE)
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await?;

        Self::check_status(response, target).await?;
        tracing::debug!(pod = %target, patches = patches.len(), "Applied label patches");
        Ok(())
    }

    async fn fetch_pod(&self, target: &ResourceRef) -> StoreResult<Pod> {
        let url = self.pod_url(target)?;
        let token = self.bearer_token().await?;

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let response = Self::check_status(response, target).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl std::fmt::Debug for KubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClient")
            .field("base_url", &self.base_url.as_str())
            .field("token_file", &self.token_file)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_config() -> KubernetesConfig {
        KubernetesConfig {
            namespace: "default".to_string(),
            pod_name: "shell-demo".to_string(),
            scheme: "http".to_string(),
            service_host: "127.0.0.1".to_string(),
            service_port: 8080,
            token_file: "/nonexistent/token".to_string(),
            ..KubernetesConfig::default()
        }
    }

    #[test]
    fn test_pod_url() {
        let client = KubeClient::new(&http_config()).unwrap();
        let url = client.pod_url(&ResourceRef::new("vault", "vault-0")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8080/api/v1/namespaces/vault/pods/vault-0"
        );
    }

    #[test]
    fn test_https_requires_ca_bundle() {
        let mut config = http_config();
        config.scheme = "https".to_string();
        config.root_ca_file = "/nonexistent/ca.crt".to_string();

        let err = KubeClient::new(&config).unwrap_err();
        assert!(matches!(err, StoreError::Credentials { .. }));
        assert!(err.to_string().contains("/nonexistent/ca.crt"));
    }

    #[tokio::test]
    async fn test_missing_token_is_credentials_error() {
        let client = KubeClient::new(&http_config()).unwrap();
        let err = client
            .apply_patches(&ResourceRef::new("default", "shell-demo"), &[])
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "credentials");
    }
}
