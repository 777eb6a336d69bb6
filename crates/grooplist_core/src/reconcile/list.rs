//! Optimistic grocery list reconciliation.
//!
//! # Responsibility
//! - Merge locally requested adds with the authoritative item stream.
//! - Expose one duplicate-free, order-stable view of the list.
//!
//! # Invariants
//! - Each authoritative snapshot replaces the confirmed set wholesale.
//! - A pending entry is shown until a snapshot carries its document, the
//!   write fails, or it is superseded; it never shows next to its document.
//! - One document resolves at most one pending entry.
//! - A pending entry only resolves against documents that were not in the
//!   confirmed set when the add began.
//! - View order: `added_at_ms` ascending, ties by id.

use crate::error::ReadError;
use crate::model::item::{
    normalize_item_name, GroceryItem, ItemId, ItemValidationError, PLACEHOLDER_ID_PREFIX,
};
use crate::store::StoreError;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Visible lifecycle state of a list entry. Deleted entries are not shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// Requested locally, not yet reported by the authoritative stream.
    Pending,
    /// Reported by the authoritative stream, not completed.
    Confirmed,
    /// Reported by the authoritative stream as completed.
    Completed,
}

/// One row of the reconciled view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub item: GroceryItem,
    pub state: ItemState,
}

/// Handle returned by `begin_add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAdd {
    pub local_id: ItemId,
    pub name: String,
    pub submitted_at_ms: i64,
}

/// Summary of one applied snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotOutcome {
    /// `(local_id, remote_id)` pairs resolved by this snapshot.
    pub resolved: Vec<(ItemId, ItemId)>,
    pub still_pending: usize,
    pub confirmed: usize,
}

#[derive(Debug, Clone)]
struct PendingItem {
    local_id: ItemId,
    name: String,
    submitter_id: Option<String>,
    submitter_name: String,
    submitted_at_ms: i64,
    remote_id: Option<ItemId>,
    preexisting: BTreeSet<ItemId>,
}

impl PendingItem {
    fn as_item(&self) -> GroceryItem {
        GroceryItem {
            id: self.local_id.clone(),
            name: self.name.clone(),
            added_by_id: self.submitter_id.clone(),
            added_by_name: self.submitter_name.clone(),
            added_at_ms: self.submitted_at_ms,
            added_at_client_ms: Some(self.submitted_at_ms),
            completion: None,
        }
    }

    fn same_submission(&self, item: &GroceryItem, window_ms: i64) -> Option<u64> {
        if self.preexisting.contains(&item.id) || item.name != self.name {
            return None;
        }
        let same_submitter = match (&self.submitter_id, &item.added_by_id) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => self.submitter_name == item.added_by_name,
        };
        if !same_submitter {
            return None;
        }
        let observed = item.added_at_client_ms.unwrap_or(item.added_at_ms);
        // Remote timestamps may hold any i64.
        let skew = observed.abs_diff(self.submitted_at_ms);
        (skew <= window_ms.unsigned_abs()).then_some(skew)
    }
}

/// Reconciled view of one household list.
#[derive(Debug, Clone)]
pub struct ListReconciler {
    confirmed: BTreeMap<ItemId, GroceryItem>,
    pending: Vec<PendingItem>,
    match_window_ms: i64,
    stream_error: Option<ReadError>,
}

impl ListReconciler {
    pub fn new(match_window_ms: i64) -> Self {
        Self {
            confirmed: BTreeMap::new(),
            pending: Vec::new(),
            match_window_ms: match_window_ms.max(0),
            stream_error: None,
        }
    }

    /// Starts an optimistic add and returns its placeholder identity.
    pub fn begin_add(
        &mut self,
        raw_name: &str,
        submitter_id: Option<&str>,
        submitter_name: &str,
        now_ms: i64,
    ) -> Result<PendingAdd, ItemValidationError> {
        let name = normalize_item_name(raw_name)?;
        let local_id = format!("{PLACEHOLDER_ID_PREFIX}{}", Uuid::new_v4().simple());
        self.pending.push(PendingItem {
            local_id: local_id.clone(),
            name: name.clone(),
            submitter_id: submitter_id.map(str::to_string),
            submitter_name: submitter_name.to_string(),
            submitted_at_ms: now_ms,
            remote_id: None,
            preexisting: self.confirmed.keys().cloned().collect(),
        });
        Ok(PendingAdd {
            local_id,
            name,
            submitted_at_ms: now_ms,
        })
    }

    /// Records the authoritative id returned by the remote create.
    ///
    /// Returns `false` when `local_id` is no longer pending, which happens
    /// when a snapshot already resolved it.
    pub fn acknowledge(&mut self, local_id: &str, remote_id: &str) -> bool {
        let Some(index) = self.pending_index(local_id) else {
            return false;
        };
        if self.confirmed.contains_key(remote_id) {
            self.pending.remove(index);
            return true;
        }
        self.pending[index].remote_id = Some(remote_id.to_string());
        true
    }

    /// Rolls back a pending add whose remote write failed.
    pub fn fail(&mut self, local_id: &str) -> bool {
        let removed = self.remove_pending(local_id);
        if removed {
            warn!("event=list_add_rollback module=reconcile status=rolled_back");
        }
        removed
    }

    /// Drops a pending add explicitly, e.g. when the user discards it.
    pub fn supersede(&mut self, local_id: &str) -> bool {
        self.remove_pending(local_id)
    }

    /// Replaces the confirmed set with an authoritative snapshot.
    pub fn apply_snapshot(&mut self, items: Vec<GroceryItem>) -> SnapshotOutcome {
        self.stream_error = None;
        self.confirmed = items
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();

        let mut claimed = self
            .pending
            .iter()
            .filter_map(|pending| pending.remote_id.clone())
            .filter(|id| self.confirmed.contains_key(id))
            .collect::<BTreeSet<_>>();

        let mut resolved = Vec::new();
        let mut remaining = Vec::with_capacity(self.pending.len());
        for pending in std::mem::take(&mut self.pending) {
            if let Some(remote_id) = pending.remote_id.clone() {
                if self.confirmed.contains_key(&remote_id) {
                    resolved.push((pending.local_id, remote_id));
                    continue;
                }
                // Acknowledged but not yet visible; only the id can resolve it.
                remaining.push(pending);
                continue;
            }

            let best = self
                .confirmed
                .values()
                .filter(|item| !claimed.contains(&item.id))
                .filter_map(|item| {
                    pending
                        .same_submission(item, self.match_window_ms)
                        .map(|skew| (skew, item.id.clone()))
                })
                .min();

            match best {
                Some((_, remote_id)) => {
                    claimed.insert(remote_id.clone());
                    resolved.push((pending.local_id.clone(), remote_id));
                }
                None => remaining.push(pending),
            }
        }
        self.pending = remaining;

        let outcome = SnapshotOutcome {
            resolved,
            still_pending: self.pending.len(),
            confirmed: self.confirmed.len(),
        };
        debug!(
            "event=list_snapshot module=reconcile status=ok confirmed={} resolved={} pending={}",
            outcome.confirmed,
            outcome.resolved.len(),
            outcome.still_pending
        );
        outcome
    }

    /// Marks the authoritative stream as failed until the next snapshot.
    pub fn fail_stream(&mut self, err: &StoreError) {
        warn!("event=list_stream module=reconcile status=error error={err}");
        self.stream_error = Some(ReadError::new(err.to_string()));
    }

    /// Current view, or the stream failure if the last delivery failed.
    pub fn view(&self) -> Result<Vec<ListEntry>, ReadError> {
        if let Some(err) = &self.stream_error {
            return Err(err.clone());
        }

        let mut entries = self
            .confirmed
            .values()
            .map(|item| ListEntry {
                state: if item.completed() {
                    ItemState::Completed
                } else {
                    ItemState::Confirmed
                },
                item: item.clone(),
            })
            .chain(self.pending.iter().map(|pending| ListEntry {
                item: pending.as_item(),
                state: ItemState::Pending,
            }))
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| a.item.list_order(&b.item));
        Ok(entries)
    }

    /// Lifecycle state of a visible id (local or remote).
    pub fn state_of(&self, id: &str) -> Option<ItemState> {
        if let Some(item) = self.confirmed.get(id) {
            return Some(if item.completed() {
                ItemState::Completed
            } else {
                ItemState::Confirmed
            });
        }
        self.pending_index(id).map(|_| ItemState::Pending)
    }

    /// Latest authoritative version of an item.
    pub fn confirmed(&self, id: &str) -> Option<&GroceryItem> {
        self.confirmed.get(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Items not yet completed, pending ones included.
    pub fn unfinished_count(&self) -> usize {
        self.pending.len()
            + self
                .confirmed
                .values()
                .filter(|item| !item.completed())
                .count()
    }

    pub fn is_errored(&self) -> bool {
        self.stream_error.is_some()
    }

    /// Forgets everything, e.g. when the session leaves the household.
    pub fn clear(&mut self) {
        self.confirmed.clear();
        self.pending.clear();
        self.stream_error = None;
    }

    fn pending_index(&self, local_id: &str) -> Option<usize> {
        self.pending
            .iter()
            .position(|pending| pending.local_id == local_id)
    }

    fn remove_pending(&mut self, local_id: &str) -> bool {
        match self.pending_index(local_id) {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ItemState, ListReconciler};
    use crate::model::item::{Completion, GroceryItem};

    fn item(id: &str, name: &str, at: i64) -> GroceryItem {
        GroceryItem {
            id: id.to_string(),
            name: name.to_string(),
            added_by_id: Some("u1".to_string()),
            added_by_name: "Ana".to_string(),
            added_at_ms: at,
            added_at_client_ms: Some(at),
            completion: None,
        }
    }

    #[test]
    fn pending_entry_uses_placeholder_id() {
        let mut reconciler = ListReconciler::new(30_000);
        let pending = reconciler.begin_add(" milk ", Some("u1"), "Ana", 10).unwrap();
        assert!(pending.local_id.starts_with("temp-"));
        assert_eq!(pending.name, "milk");
        assert_eq!(reconciler.state_of(&pending.local_id), Some(ItemState::Pending));
    }

    #[test]
    fn acknowledge_after_snapshot_resolution_reports_not_pending() {
        let mut reconciler = ListReconciler::new(30_000);
        let pending = reconciler.begin_add("milk", Some("u1"), "Ana", 10).unwrap();
        reconciler.apply_snapshot(vec![item("r1", "milk", 10)]);
        assert!(!reconciler.acknowledge(&pending.local_id, "r1"));
        assert_eq!(reconciler.view().unwrap().len(), 1);
    }

    #[test]
    fn completed_items_report_completed_state() {
        let mut reconciler = ListReconciler::new(30_000);
        let mut done = item("r1", "milk", 10);
        done.completion = Some(Completion {
            by_id: Some("u2".to_string()),
            by_name: "Ben".to_string(),
            at_ms: 20,
        });
        reconciler.apply_snapshot(vec![done, item("r2", "eggs", 11)]);
        assert_eq!(reconciler.state_of("r1"), Some(ItemState::Completed));
        assert_eq!(reconciler.state_of("r2"), Some(ItemState::Confirmed));
        assert_eq!(reconciler.unfinished_count(), 1);
    }

    #[test]
    fn extreme_remote_timestamps_never_match_pending_add() {
        let mut reconciler = ListReconciler::new(30_000);
        let pending = reconciler.begin_add("milk", Some("u1"), "Ana", 1_000).unwrap();
        let mut early = item("r1", "milk", 0);
        early.added_at_client_ms = Some(i64::MIN);
        let mut late = item("r2", "milk", 0);
        late.added_at_client_ms = Some(i64::MAX);

        let outcome = reconciler.apply_snapshot(vec![early, late]);
        assert!(outcome.resolved.is_empty());
        assert_eq!(reconciler.state_of(&pending.local_id), Some(ItemState::Pending));
        assert_eq!(reconciler.view().unwrap().len(), 3);
    }
}
