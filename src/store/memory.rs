//! In-process label store.
//!
//! Applies JSON patches to an in-memory pod map. Failures can be injected to
//! exercise retries.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::patch::{Operation, Patch};
use crate::store::types::{ObjectMeta, Pod, ResourceRef, StoreError, StoreResult};
use crate::store::PatchStore;

const LABELS_PATH: &str = "/metadata/labels";

/// Thread-safe fake of the pod API.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    pods: Mutex<HashMap<ResourceRef, Pod>>,
    fail_next: AtomicUsize,
    apply_calls: AtomicUsize,
    applied: Mutex<Vec<Patch>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with one pod that has no labels map.
    pub fn with_pod(target: &ResourceRef) -> Self {
        let store = Self::new();
        store.insert_pod(target, None);
        store
    }

    pub fn insert_pod(&self, target: &ResourceRef, labels: Option<BTreeMap<String, String>>) {
        let pod = Pod {
            metadata: ObjectMeta {
                name: target.name.clone(),
                namespace: target.namespace.clone(),
                labels,
            },
        };
        self.pods
            .lock()
            .expect("memory store mutex poisoned")
            .insert(target.clone(), pod);
    }

    pub fn remove_pod(&self, target: &ResourceRef) {
        self.pods.lock().expect("memory store mutex poisoned").remove(target);
    }

    /// Make the next `n` calls to `apply_patches` fail.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of `apply_patches` calls, failed ones included.
    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    /// Every patch successfully applied, in order.
    pub fn applied(&self) -> Vec<Patch> {
        self.applied.lock().expect("memory store mutex poisoned").clone()
    }

    /// Current label value on a pod.
    pub fn label(&self, target: &ResourceRef, key: &str) -> Option<String> {
        let pods = self.pods.lock().expect("memory store mutex poisoned");
        pods.get(target)?.metadata.labels.as_ref()?.get(key).cloned()
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PatchStore for InMemoryStore {
    async fn apply_patches(&self, target: &ResourceRef, patches: &[Patch]) -> StoreResult<()> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_injected_failure() {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }

        let mut pods = self.pods.lock().expect("memory store mutex poisoned");
        let pod = pods
            .get_mut(target)
            .ok_or_else(|| StoreError::NotFound(target.clone()))?;

        // Work on a copy so a bad patch leaves the pod untouched.
        let mut labels = pod.metadata.labels.clone();
        for patch in patches {
            apply_one(&mut labels, patch)?;
        }
        pod.metadata.labels = labels;

        self.applied
            .lock()
            .expect("memory store mutex poisoned")
            .extend_from_slice(patches);
        Ok(())
    }

    async fn fetch_pod(&self, target: &ResourceRef) -> StoreResult<Pod> {
        let pods = self.pods.lock().expect("memory store mutex poisoned");
        pods.get(target)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(target.clone()))
    }
}

fn apply_one(labels: &mut Option<BTreeMap<String, String>>, patch: &Patch) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::Status {
        code: 422,
        body: format!("{} {}: {}", op_name(patch.operation), patch.path, reason),
    };

    if patch.path == LABELS_PATH {
        return match patch.operation {
            Operation::Remove => {
                *labels = None;
                Ok(())
            }
            _ => {
                let map: BTreeMap<String, String> =
                    serde_json::from_value(patch.value.clone()).map_err(|_| invalid("value is not a label map"))?;
                *labels = Some(map);
                Ok(())
            }
        };
    }

    let key = patch
        .path
        .strip_prefix(LABELS_PATH)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(|| invalid("path is not a label"))?;
    let key = key.replace("~1", "/").replace("~0", "~");
    let map = labels.as_mut().ok_or_else(|| invalid("labels map does not exist"))?;

    match patch.operation {
        Operation::Add => {
            let value = patch.value.as_str().ok_or_else(|| invalid("value is not a string"))?;
            map.insert(key, value.to_string());
        }
        Operation::Replace => {
            let value = patch.value.as_str().ok_or_else(|| invalid("value is not a string"))?;
            let slot = map.get_mut(&key).ok_or_else(|| invalid("label does not exist"))?;
            *slot = value.to_string();
        }
        Operation::Remove => {
            map.remove(&key).ok_or_else(|| invalid("label does not exist"))?;
        }
    }
    Ok(())
}

fn op_name(op: Operation) -> &'static str {
    match op {
        Operation::Add => "add",
        Operation::Replace => "replace",
        Operation::Remove => "remove",
    }
}
