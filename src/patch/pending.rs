//! Pending set of not-yet-applied patches.
//!
//! # Invariants
//! - At most one entry per path
//! - At most `capacity` entries; a new path past that is rejected, nothing is evicted
//! - Each entry remembers the value the remote is believed to hold for its path.
//!   A notify cancels an entry only when it asks for exactly that value, so a
//!   cancelled path never leaves the remote behind
//! - A path that is part of an in-flight snapshot is never cancelled, since the
//!   remote value is unknown until the flush completes

use std::collections::BTreeMap;

use crate::patch::types::{Patch, PatchError};

/// What `coalesce` did with a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coalesced {
    /// New path, now pending.
    Queued,
    /// Same operation and value already pending.
    Duplicate,
    /// Asked for the value the remote already holds; pending entry dropped.
    Cancelled,
    /// Pending entry overwritten.
    Replaced,
}

#[derive(Debug)]
struct Entry {
    patch: Patch,
    value: bool,
    // Value the remote holds for this path, as far as the set knows.
    remote: bool,
}

/// Ordered map of path → most recent pending patch.
#[derive(Debug)]
pub struct PendingSet {
    entries: BTreeMap<String, Entry>,
    capacity: usize,
    in_flight: Option<Vec<Patch>>,
}

impl PendingSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity,
            in_flight: None,
        }
    }

    /// Merge a patch into the set.
    ///
    /// The decision depends on the value alone; the operation of the latest
    /// patch is what gets sent.
    pub fn coalesce(&mut self, patch: Patch) -> Result<Coalesced, PatchError> {
        let value = patch.bool_value()?;
        let in_flight = self.is_in_flight(&patch.path);

        if let Some(existing) = self.entries.get_mut(&patch.path) {
            if existing.value == value {
                if existing.patch.operation == patch.operation {
                    return Ok(Coalesced::Duplicate);
                }
                existing.patch = patch;
                return Ok(Coalesced::Replaced);
            }

            if value == existing.remote && !in_flight {
                self.entries.remove(&patch.path);
                return Ok(Coalesced::Cancelled);
            }

            existing.patch = patch;
            existing.value = value;
            return Ok(Coalesced::Replaced);
        }

        if self.entries.len() >= self.capacity {
            return Err(PatchError::PendingSetFull {
                path: patch.path,
                capacity: self.capacity,
            });
        }

        self.entries.insert(
            patch.path.clone(),
            Entry {
                patch,
                value,
                remote: !value,
            },
        );
        Ok(Coalesced::Queued)
    }

    /// Take a snapshot of every pending patch and mark it in flight.
    ///
    /// Returns `None` when there is nothing to send.
    pub fn begin_flush(&mut self) -> Option<Vec<Patch>> {
        if self.entries.is_empty() {
            return None;
        }
        let snapshot = self.patches();
        self.in_flight = Some(snapshot.clone());
        Some(snapshot)
    }

    /// Close the in-flight snapshot.
    ///
    /// When `applied`, entries whose value the remote now holds are removed
    /// and the rest learn the new remote value. A failed flush leaves every
    /// entry as it was. Returns the number of entries removed.
    pub fn finish_flush(&mut self, applied: bool) -> usize {
        let Some(snapshot) = self.in_flight.take() else {
            return 0;
        };
        if !applied {
            return 0;
        }

        let mut cleared = 0;
        for sent in snapshot {
            // Snapshot entries passed validation when they were queued.
            let Ok(sent_value) = sent.bool_value() else {
                continue;
            };
            let Some(entry) = self.entries.get_mut(&sent.path) else {
                continue;
            };
            if entry.value == sent_value {
                self.entries.remove(&sent.path);
                cleared += 1;
            } else {
                entry.remote = sent_value;
            }
        }
        cleared
    }

    /// Drop every pending entry. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        self.in_flight = None;
        dropped
    }

    fn is_in_flight(&self, path: &str) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|sent| sent.iter().any(|p| p.path == path))
    }

    pub fn get(&self, path: &str) -> Option<&Patch> {
        self.entries.get(path).map(|entry| &entry.patch)
    }

    /// Clone of every pending patch, ordered by path.
    pub fn patches(&self) -> Vec<Patch> {
        self.entries.values().map(|entry| entry.patch.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
