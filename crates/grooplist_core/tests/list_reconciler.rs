use grooplist_core::error::ReadError;
use grooplist_core::model::item::ItemValidationError;
use grooplist_core::store::StoreError;
use grooplist_core::{GroceryItem, ItemState, ListReconciler};

const WINDOW_MS: i64 = 30_000;

fn remote(id: &str, name: &str, by: &str, added_at_ms: i64) -> GroceryItem {
    GroceryItem {
        id: id.to_string(),
        name: name.to_string(),
        added_by_id: Some(by.to_string()),
        added_by_name: by.to_uppercase(),
        added_at_ms,
        added_at_client_ms: Some(added_at_ms),
        completion: None,
    }
}

#[test]
fn optimistic_add_then_matching_snapshot_shows_one_item() {
    let mut reconciler = ListReconciler::new(WINDOW_MS);
    let pending = reconciler.begin_add("Milk", Some("u1"), "U1", 1_000).unwrap();
    assert_eq!(reconciler.view().unwrap().len(), 1);

    let outcome = reconciler.apply_snapshot(vec![remote("r1", "Milk", "u1", 1_250)]);
    assert_eq!(outcome.resolved, vec![(pending.local_id.clone(), "r1".to_string())]);

    let view = reconciler.view().unwrap();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].item.id, "r1");
    assert_eq!(view[0].state, ItemState::Confirmed);
    assert_eq!(reconciler.state_of(&pending.local_id), None);
}

#[test]
fn acknowledged_add_resolves_by_remote_id_only() {
    let mut reconciler = ListReconciler::new(WINDOW_MS);
    let pending = reconciler.begin_add("Milk", Some("u1"), "U1", 1_000).unwrap();
    assert!(reconciler.acknowledge(&pending.local_id, "r2"));

    // Same shape, different id: must not steal the acknowledged entry.
    reconciler.apply_snapshot(vec![remote("r1", "Milk", "u1", 1_000)]);
    assert_eq!(reconciler.pending_count(), 1);
    assert_eq!(reconciler.view().unwrap().len(), 2);

    reconciler.apply_snapshot(vec![
        remote("r1", "Milk", "u1", 1_000),
        remote("r2", "Milk", "u1", 1_000),
    ]);
    assert_eq!(reconciler.pending_count(), 0);
    assert_eq!(reconciler.view().unwrap().len(), 2);
}

#[test]
fn failed_add_is_removed_from_view() {
    let mut reconciler = ListReconciler::new(WINDOW_MS);
    reconciler.apply_snapshot(vec![remote("r1", "Eggs", "u2", 10)]);
    let pending = reconciler.begin_add("Milk", Some("u1"), "U1", 1_000).unwrap();
    assert_eq!(reconciler.view().unwrap().len(), 2);

    assert!(reconciler.fail(&pending.local_id));
    let view = reconciler.view().unwrap();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].item.id, "r1");
    assert!(!reconciler.fail(&pending.local_id));
}

#[test]
fn two_identical_adds_resolve_against_two_documents() {
    let mut reconciler = ListReconciler::new(WINDOW_MS);
    let first = reconciler.begin_add("Milk", Some("u1"), "U1", 1_000).unwrap();
    let second = reconciler.begin_add("Milk", Some("u1"), "U1", 5_000).unwrap();

    reconciler.apply_snapshot(vec![remote("r1", "Milk", "u1", 1_000)]);
    assert_eq!(reconciler.state_of(&first.local_id), None);
    assert_eq!(reconciler.state_of(&second.local_id), Some(ItemState::Pending));

    let outcome = reconciler.apply_snapshot(vec![
        remote("r1", "Milk", "u1", 1_000),
        remote("r2", "Milk", "u1", 5_000),
    ]);
    assert_eq!(outcome.resolved, vec![(second.local_id, "r2".to_string())]);
    assert_eq!(reconciler.view().unwrap().len(), 2);
}

#[test]
fn preexisting_document_never_resolves_a_new_add() {
    let mut reconciler = ListReconciler::new(WINDOW_MS);
    reconciler.apply_snapshot(vec![remote("r1", "Milk", "u1", 1_000)]);
    let pending = reconciler.begin_add("Milk", Some("u1"), "U1", 1_500).unwrap();

    reconciler.apply_snapshot(vec![remote("r1", "Milk", "u1", 1_000)]);
    assert_eq!(reconciler.state_of(&pending.local_id), Some(ItemState::Pending));
}

#[test]
fn other_submitter_or_stale_time_does_not_match() {
    let mut reconciler = ListReconciler::new(WINDOW_MS);
    let pending = reconciler.begin_add("Milk", Some("u1"), "U1", 1_000).unwrap();
    reconciler.apply_snapshot(vec![
        remote("r1", "Milk", "u2", 1_000),
        remote("r2", "Milk", "u1", 1_000 + WINDOW_MS + 1),
        remote("r3", "milk", "u1", 1_000),
    ]);
    assert_eq!(reconciler.state_of(&pending.local_id), Some(ItemState::Pending));
    assert_eq!(reconciler.view().unwrap().len(), 4);
}

#[test]
fn view_is_ordered_by_added_time_then_id() {
    let mut reconciler = ListReconciler::new(WINDOW_MS);
    reconciler.apply_snapshot(vec![
        remote("b", "Bread", "u1", 20),
        remote("c", "Coffee", "u1", 10),
        remote("a", "Apples", "u1", 20),
    ]);
    let ids = reconciler
        .view()
        .unwrap()
        .into_iter()
        .map(|entry| entry.item.id)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["c", "a", "b"]);
}

#[test]
fn stream_failure_replaces_view_until_next_snapshot() {
    let mut reconciler = ListReconciler::new(WINDOW_MS);
    reconciler.apply_snapshot(vec![remote("r1", "Milk", "u1", 1)]);
    reconciler.fail_stream(&StoreError::PermissionDenied("rules".to_string()));

    let err: ReadError = reconciler.view().unwrap_err();
    assert!(err.message().contains("permission denied"));
    assert!(reconciler.is_errored());

    reconciler.apply_snapshot(vec![remote("r1", "Milk", "u1", 1)]);
    assert_eq!(reconciler.view().unwrap().len(), 1);
}

#[test]
fn blank_names_are_rejected_before_anything_is_shown() {
    let mut reconciler = ListReconciler::new(WINDOW_MS);
    let err = reconciler.begin_add("   ", Some("u1"), "U1", 1).unwrap_err();
    assert_eq!(err, ItemValidationError::EmptyName);
    assert!(reconciler.view().unwrap().is_empty());
}

#[test]
fn supersede_drops_pending_entry() {
    let mut reconciler = ListReconciler::new(WINDOW_MS);
    let pending = reconciler.begin_add("Milk", None, "Guest", 1).unwrap();
    assert!(reconciler.supersede(&pending.local_id));
    assert_eq!(reconciler.pending_count(), 0);
    assert_eq!(reconciler.unfinished_count(), 0);
}
