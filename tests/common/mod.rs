//! Fake Kubernetes pod API shared by integration tests.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;

use pod_registrar::config::KubernetesConfig;
use pod_registrar::store::{InMemoryStore, PatchStore, ResourceRef, StoreError};
use pod_registrar::Patch;

pub const TEST_NAMESPACE: &str = "default";
pub const TEST_POD_NAME: &str = "shell-demo";
pub const TEST_TOKEN: &str = "test-token";

/// Pod API backed by an in-memory store, with failure injection.
#[derive(Clone)]
pub struct FakeApi {
    pub pods: Arc<InMemoryStore>,
    fail_next: Arc<AtomicUsize>,
    fail_status: Arc<AtomicU16>,
    patch_requests: Arc<AtomicUsize>,
}

impl FakeApi {
    /// Make the next `n` PATCH requests fail with `status`.
    pub fn fail_next(&self, n: usize, status: StatusCode) {
        self.fail_status.store(status.as_u16(), Ordering::SeqCst);
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// PATCH requests received, failed ones included.
    pub fn patch_requests(&self) -> usize {
        self.patch_requests.load(Ordering::SeqCst)
    }

    pub fn label(&self, key: &str) -> Option<String> {
        self.pods.label(&test_target(), key)
    }

    pub async fn labels(&self) -> BTreeMap<String, String> {
        self.pods
            .fetch_pod(&test_target())
            .await
            .ok()
            .and_then(|pod| pod.metadata.labels)
            .unwrap_or_default()
    }
}

pub fn test_target() -> ResourceRef {
    ResourceRef::new(TEST_NAMESPACE, TEST_POD_NAME)
}

/// A running fake API plus a client config pointing at it.
pub struct TestServer {
    pub api: FakeApi,
    pub addr: SocketAddr,
    pub config: KubernetesConfig,
    token_file: PathBuf,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.token_file);
    }
}

/// Start a fake API with one pod (`default/shell-demo`) that has no labels.
pub async fn start_test_server() -> TestServer {
    let api = FakeApi {
        pods: Arc::new(InMemoryStore::with_pod(&test_target())),
        fail_next: Arc::new(AtomicUsize::new(0)),
        fail_status: Arc::new(AtomicU16::new(500)),
        patch_requests: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .route(
            "/api/v1/namespaces/{namespace}/pods/{name}",
            get(get_pod).patch(patch_pod),
        )
        .with_state(api.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let token_file = std::env::temp_dir().join(format!("pod-registrar-token-{}", addr.port()));
    std::fs::write(&token_file, format!("{}\n", TEST_TOKEN)).unwrap();

    let config = KubernetesConfig {
        namespace: TEST_NAMESPACE.to_string(),
        pod_name: TEST_POD_NAME.to_string(),
        scheme: "http".to_string(),
        service_host: addr.ip().to_string(),
        service_port: addr.port(),
        token_file: token_file.display().to_string(),
        request_timeout_secs: 2,
        ..KubernetesConfig::default()
    };

    TestServer {
        api,
        addr,
        config,
        token_file,
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", TEST_TOKEN))
}

fn store_error_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND.into_response(),
        StoreError::Status { code, body } => (
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response(),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
    }
}

async fn get_pod(
    State(api): State<FakeApi>,
    Path((namespace, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match api.pods.fetch_pod(&ResourceRef::new(namespace, name)).await {
        Ok(pod) => Json(pod).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn patch_pod(
    State(api): State<FakeApi>,
    Path((namespace, name)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    api.patch_requests.fetch_add(1, Ordering::SeqCst);

    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    if content_type != Some("application/json-patch+json") {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }

    let injected = api
        .fail_next
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if injected {
        let status = StatusCode::from_u16(api.fail_status.load(Ordering::SeqCst))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, "injected failure").into_response();
    }

    let patches: Vec<Patch> = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let target = ResourceRef::new(namespace, name);
    match api.pods.apply_patches(&target, &patches).await {
        Ok(()) => match api.pods.fetch_pod(&target).await {
            Ok(pod) => Json(pod).into_response(),
            Err(e) => store_error_response(e),
        },
        Err(e) => store_error_response(e),
    }
}
