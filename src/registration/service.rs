//! Service registration on the pod's labels.
//!
//! # Responsibilities
//! - Verify the pod exists before anything else runs
//! - Write the full initial state once at startup
//! - Turn state-change hooks into label patches for the retry engine
//! - Leave `active=false`, `sealed=true`, `perf-standby=false` behind on shutdown

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::RetryConfig;
use crate::lifecycle::{BackgroundTasks, Shutdown};
use crate::patch::{Operation, Patch, PatchError};
use crate::registration::labels::{
    bool_patch, label_path, LABEL_ACTIVE, LABEL_INITIALIZED, LABEL_PERF_STANDBY, LABEL_SEALED,
    LABEL_VAULT_VERSION, PATH_TO_LABELS,
};
use crate::registration::retry::RetryEngine;
use crate::store::{PatchStore, ResourceRef, StoreError};

/// Locally-known state mirrored onto the pod.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationState {
    pub vault_version: String,
    pub is_initialized: bool,
    pub is_sealed: bool,
    pub is_active: bool,
    pub is_performance_standby: bool,
}

/// Errors that stop registration from starting.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("unable to read pod {target}: {source}")]
    Lookup {
        target: ResourceRef,
        #[source]
        source: StoreError,
    },

    #[error("unable to apply initial labels to {target}: {source}")]
    InitialState {
        target: ResourceRef,
        #[source]
        source: StoreError,
    },
}

/// Keeps a pod's labels in line with the process state.
pub struct ServiceRegistration {
    store: Arc<dyn PatchStore>,
    target: ResourceRef,
    initial_state: RegistrationState,
    has_labels: bool,
    engine: Arc<RetryEngine>,
}

impl ServiceRegistration {
    /// Check the pod exists and prepare the retry engine.
    pub async fn new(
        store: Arc<dyn PatchStore>,
        target: ResourceRef,
        initial_state: RegistrationState,
        retry: &RetryConfig,
    ) -> Result<Self, RegistrationError> {
        let pod = store
            .fetch_pod(&target)
            .await
            .map_err(|source| RegistrationError::Lookup {
                target: target.clone(),
                source,
            })?;

        let engine = Arc::new(RetryEngine::new(
            Arc::clone(&store),
            target.clone(),
            retry.interval(),
            retry.max_pending,
        ));

        Ok(Self {
            store,
            target,
            initial_state,
            has_labels: pod.metadata.labels.is_some(),
            engine,
        })
    }

    /// Apply the initial labels and start the background tasks.
    ///
    /// The returned handles finish once `shutdown` is triggered and the final
    /// labels have been written (or failed to be).
    pub async fn run(&self, shutdown: &Shutdown) -> Result<BackgroundTasks, RegistrationError> {
        let patches = self.initial_patches();
        self.store
            .apply_patches(&self.target, &patches)
            .await
            .map_err(|source| RegistrationError::InitialState {
                target: self.target.clone(),
                source,
            })?;
        tracing::info!(pod = %self.target, labels = patches.len(), "Applied initial pod labels");

        let mut tasks = BackgroundTasks::new();

        let engine = Arc::clone(&self.engine);
        let rx = shutdown.subscribe();
        tasks.push("label-retry", tokio::spawn(async move { engine.run(rx).await }));

        let engine = Arc::clone(&self.engine);
        let rx = shutdown.subscribe();
        tasks.push("label-finalizer", tokio::spawn(leave_final_state(engine, rx)));

        Ok(tasks)
    }

    fn initial_patches(&self) -> Vec<Patch> {
        let state = &self.initial_state;
        let mut patches = Vec::with_capacity(6);

        // JSON-patch cannot add below a map that does not exist.
        if !self.has_labels {
            patches.push(Patch::with_json(
                Operation::Add,
                PATH_TO_LABELS,
                serde_json::json!({}),
            ));
        }

        patches.push(Patch::new(
            Operation::Add,
            label_path(LABEL_VAULT_VERSION),
            state.vault_version.clone(),
        ));
        patches.push(bool_patch(Operation::Add, LABEL_ACTIVE, state.is_active));
        patches.push(bool_patch(Operation::Add, LABEL_SEALED, state.is_sealed));
        patches.push(bool_patch(Operation::Add, LABEL_PERF_STANDBY, state.is_performance_standby));
        patches.push(bool_patch(Operation::Add, LABEL_INITIALIZED, state.is_initialized));
        patches
    }

    pub fn notify_active_state_change(&self, is_active: bool) -> Result<(), PatchError> {
        self.notify(LABEL_ACTIVE, is_active)
    }

    pub fn notify_sealed_state_change(&self, is_sealed: bool) -> Result<(), PatchError> {
        self.notify(LABEL_SEALED, is_sealed)
    }

    pub fn notify_performance_standby_state_change(&self, is_standby: bool) -> Result<(), PatchError> {
        self.notify(LABEL_PERF_STANDBY, is_standby)
    }

    pub fn notify_initialized_state_change(&self, is_initialized: bool) -> Result<(), PatchError> {
        self.notify(LABEL_INITIALIZED, is_initialized)
    }

    fn notify(&self, label: &str, value: bool) -> Result<(), PatchError> {
        self.engine
            .notify(bool_patch(Operation::Replace, label, value))
            .map(|_| ())
    }

    pub fn engine(&self) -> &Arc<RetryEngine> {
        &self.engine
    }

    pub fn target(&self) -> &ResourceRef {
        &self.target
    }
}

/// Labels left on the pod once the process stops serving.
pub fn final_state_patches() -> Vec<Patch> {
    vec![
        bool_patch(Operation::Replace, LABEL_ACTIVE, false),
        bool_patch(Operation::Replace, LABEL_SEALED, true),
        bool_patch(Operation::Replace, LABEL_PERF_STANDBY, false),
    ]
}

async fn leave_final_state(engine: Arc<RetryEngine>, mut shutdown: broadcast::Receiver<()>) {
    let _ = shutdown.recv().await;

    match engine.apply_final(&final_state_patches()).await {
        Ok(()) => tracing::info!(pod = %engine.target(), "Left final labels on pod"),
        Err(e) => tracing::warn!(
            pod = %engine.target(),
            error = %e,
            "Unable to leave final labels on pod"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::labels::BOOLEAN_LABELS;
    use crate::store::InMemoryStore;
    use std::time::Duration;

    const TEST_VERSION: &str = "version 1";

    fn target() -> ResourceRef {
        ResourceRef::new("default", "shell-demo")
    }

    fn all_true() -> RegistrationState {
        RegistrationState {
            vault_version: TEST_VERSION.to_string(),
            is_initialized: true,
            is_sealed: true,
            is_active: true,
            is_performance_standby: true,
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            interval_ms: 10,
            ..RetryConfig::default()
        }
    }

    #[tokio::test]
    async fn test_missing_pod_fails_fast() {
        let store = Arc::new(InMemoryStore::new());
        let err = ServiceRegistration::new(store, target(), all_true(), &fast_retry())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RegistrationError::Lookup { source: StoreError::NotFound(_), .. }));
    }

    #[tokio::test]
    async fn test_initial_state_creates_labels_map() {
        let store = Arc::new(InMemoryStore::with_pod(&target()));
        let reg = ServiceRegistration::new(store.clone(), target(), all_true(), &fast_retry())
            .await
            .unwrap();
        let shutdown = Shutdown::new();
        let tasks = reg.run(&shutdown).await.unwrap();

        let labels = store.fetch_pod(&target()).await.unwrap().metadata.labels.unwrap();
        assert_eq!(labels.len(), 5);
        assert_eq!(labels[LABEL_VAULT_VERSION], TEST_VERSION);
        for label in BOOLEAN_LABELS {
            assert_eq!(labels[label], "true", "{label}");
        }

        shutdown.trigger();
        tasks.join().await;
    }

    #[tokio::test]
    async fn test_existing_labels_are_kept() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_pod(
            &target(),
            Some([("app".to_string(), "vault".to_string())].into_iter().collect()),
        );
        let reg = ServiceRegistration::new(store.clone(), target(), all_true(), &fast_retry())
            .await
            .unwrap();
        assert_eq!(reg.initial_patches().len(), 5);

        let shutdown = Shutdown::new();
        let tasks = reg.run(&shutdown).await.unwrap();
        assert_eq!(store.label(&target(), "app").as_deref(), Some("vault"));

        shutdown.trigger();
        tasks.join().await;
    }

    #[tokio::test]
    async fn test_initial_state_failure_is_returned() {
        let store = Arc::new(InMemoryStore::with_pod(&target()));
        store.fail_next(1);
        let reg = ServiceRegistration::new(store, target(), all_true(), &fast_retry())
            .await
            .unwrap();

        let err = reg.run(&Shutdown::new()).await.err().unwrap();
        assert!(matches!(err, RegistrationError::InitialState { .. }));
    }

    #[tokio::test]
    async fn test_notify_hooks_reach_the_pod() {
        let store = Arc::new(InMemoryStore::with_pod(&target()));
        let reg = ServiceRegistration::new(store.clone(), target(), all_true(), &fast_retry())
            .await
            .unwrap();
        let shutdown = Shutdown::new();
        let tasks = reg.run(&shutdown).await.unwrap();

        reg.notify_active_state_change(false).unwrap();
        reg.notify_sealed_state_change(false).unwrap();
        reg.notify_performance_standby_state_change(false).unwrap();
        reg.notify_initialized_state_change(false).unwrap();
        assert_eq!(reg.engine().pending_len(), 4);

        tokio::time::timeout(Duration::from_secs(2), async {
            while reg.engine().pending_len() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("pending labels were never flushed");

        for label in BOOLEAN_LABELS {
            assert_eq!(store.label(&target(), label).as_deref(), Some("false"), "{label}");
        }

        shutdown.trigger();
        tasks.join().await;
    }

    #[tokio::test]
    async fn test_shutdown_leaves_final_state() {
        let store = Arc::new(InMemoryStore::with_pod(&target()));
        let mut state = all_true();
        state.is_sealed = false;
        let reg = ServiceRegistration::new(store.clone(), target(), state, &fast_retry())
            .await
            .unwrap();
        let shutdown = Shutdown::new();
        let tasks = reg.run(&shutdown).await.unwrap();
        assert_eq!(tasks.len(), 2);

        shutdown.trigger();
        tasks.join().await;

        assert_eq!(store.label(&target(), LABEL_ACTIVE).as_deref(), Some("false"));
        assert_eq!(store.label(&target(), LABEL_SEALED).as_deref(), Some("true"));
        assert_eq!(store.label(&target(), LABEL_PERF_STANDBY).as_deref(), Some("false"));
        assert_eq!(store.label(&target(), LABEL_INITIALIZED).as_deref(), Some("true"));
    }
}
