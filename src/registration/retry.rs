//! Patch-coalescing retry engine.
//!
//! # Responsibilities
//! - Accept label changes from any number of callers without doing I/O
//! - Coalesce them per path (see [`PendingSet`])
//! - Replay the whole pending set on a fixed period until the store accepts it
//!
//! # Design Decisions
//! - One `std::sync::Mutex` guards the pending set and is never held across `.await`
//! - A flush snapshots under the lock, calls the store unlocked, then clears
//!   only entries whose value the remote now holds
//! - The fixed period is the only backoff; failures retry forever
//! - `NotFound` is retried like any other failure but logged and counted apart

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::observability::metrics;
use crate::patch::{Coalesced, Patch, PatchError, PendingSet};
use crate::store::{PatchStore, ResourceRef, StoreError, StoreResult};

/// How often pending patches are retried unless configured otherwise.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Retries label patches until they stick.
pub struct RetryEngine {
    store: Arc<dyn PatchStore>,
    target: ResourceRef,
    interval: Duration,
    pending: Mutex<PendingSet>,
    // Serializes flushes so only one snapshot is in flight.
    flushing: tokio::sync::Mutex<()>,
}

impl RetryEngine {
    pub fn new(
        store: Arc<dyn PatchStore>,
        target: ResourceRef,
        interval: Duration,
        capacity: usize,
    ) -> Self {
        Self {
            store,
            target,
            interval,
            pending: Mutex::new(PendingSet::new(capacity)),
            flushing: tokio::sync::Mutex::new(()),
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingSet> {
        self.pending.lock().expect("pending set mutex poisoned")
    }

    /// Queue a change for the next flush. Never blocks on the network.
    pub fn notify(&self, patch: Patch) -> Result<Coalesced, PatchError> {
        let path = patch.path.clone();
        let (result, pending) = {
            let mut set = self.lock_pending();
            let result = set.coalesce(patch);
            (result, set.len())
        };

        match &result {
            Ok(outcome) => {
                tracing::debug!(path = %path, outcome = ?outcome, pending, "Coalesced label change");
                metrics::record_notification(outcome_label(*outcome));
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Rejected label change");
                metrics::record_notification("rejected");
            }
        }
        metrics::record_pending(pending);
        result
    }

    /// Attempt to deliver everything pending as one batch.
    ///
    /// Returns the number of patches sent, `0` when there was nothing to do.
    pub async fn flush(&self) -> StoreResult<usize> {
        let _flushing = self.flushing.lock().await;

        let snapshot = {
            let mut set = self.lock_pending();
            set.begin_flush()
        };
        let Some(snapshot) = snapshot else {
            return Ok(0);
        };

        let result = self.store.apply_patches(&self.target, &snapshot).await;

        let pending = {
            let mut set = self.lock_pending();
            set.finish_flush(result.is_ok());
            set.len()
        };
        metrics::record_pending(pending);

        match result {
            Ok(()) => {
                metrics::record_flush_success();
                tracing::info!(pod = %self.target, applied = snapshot.len(), pending, "Label state updated");
                Ok(snapshot.len())
            }
            Err(e) => {
                metrics::record_flush_failure(e.reason());
                log_delivery_failure(&self.target, &e, pending);
                Err(e)
            }
        }
    }

    /// Send `patches` immediately, superseding anything pending.
    ///
    /// Waits for an in-flight flush to finish first so it cannot land after
    /// these patches. Used to leave final labels behind on shutdown.
    pub async fn apply_final(&self, patches: &[Patch]) -> StoreResult<()> {
        let _flushing = self.flushing.lock().await;
        let discarded = {
            let mut set = self.lock_pending();
            set.clear()
        };
        metrics::record_pending(0);
        if discarded > 0 {
            tracing::debug!(discarded, "Dropped pending label changes in favour of final state");
        }
        self.store.apply_patches(&self.target, patches).await
    }

    /// Flush on a fixed period until `shutdown` fires.
    ///
    /// The first attempt happens one period after start. An in-flight store
    /// call is allowed to finish before shutdown is observed.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            pod = %self.target,
            interval_ms = self.interval.as_millis() as u64,
            "Label retry loop starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Failures are logged inside flush and retried next tick.
                    let _ = self.flush().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Label retry loop received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Copy of the pending patches, ordered by path.
    pub fn pending(&self) -> Vec<Patch> {
        self.lock_pending().patches()
    }

    pub fn pending_len(&self) -> usize {
        self.lock_pending().len()
    }

    pub fn target(&self) -> &ResourceRef {
        &self.target
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl std::fmt::Debug for RetryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryEngine")
            .field("target", &self.target)
            .field("interval", &self.interval)
            .field("pending", &self.pending_len())
            .finish()
    }
}

fn outcome_label(outcome: Coalesced) -> &'static str {
    match outcome {
        Coalesced::Queued => "queued",
        Coalesced::Duplicate => "duplicate",
        Coalesced::Cancelled => "cancelled",
        Coalesced::Replaced => "replaced",
    }
}

fn log_delivery_failure(target: &ResourceRef, error: &StoreError, pending: usize) {
    if error.is_not_found() {
        tracing::warn!(
            pod = %target,
            pending,
            "Pod not found while updating labels, will retry; it may not be registered yet or may have been deleted"
        );
    } else {
        tracing::warn!(
            pod = %target,
            error = %error,
            reason = error.reason(),
            pending,
            "Unable to update label state, will retry"
        );
    }
}
