use grooplist_core::model::item::{Completion, CompletionPatch};
use grooplist_core::store::{encode, CollectionPath, DocumentStore, StoreError};
use grooplist_core::{
    CoreError, GroceryListService, HouseholdRef, Identity, InMemoryDocumentStore, ItemState,
    ManualClock, MembershipService, SessionContext, WriteError,
};
use std::sync::Arc;

struct Fixture {
    store: Arc<InMemoryDocumentStore>,
    clock: Arc<ManualClock>,
    household: HouseholdRef,
}

impl Fixture {
    fn new() -> Self {
        let store = Arc::new(InMemoryDocumentStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let membership = MembershipService::new(store.clone(), clock.clone());
        let household = membership
            .create_household(&session("u1", "Ana"), "Home")
            .unwrap();
        Self {
            store,
            clock,
            household,
        }
    }

    fn service(&self) -> GroceryListService {
        GroceryListService::new(self.store.clone(), self.clock.clone(), 30_000)
    }

    fn member(&self, uid: &str, name: &str) -> SessionContext {
        session(uid, name).with_household(self.household.clone())
    }

    fn items(&self) -> CollectionPath {
        CollectionPath::household_items(&self.household.code)
    }
}

fn session(uid: &str, name: &str) -> SessionContext {
    SessionContext::new(
        Identity {
            user_id: uid.to_string(),
            display_name: Some(name.to_string()),
        },
        name,
    )
}

#[test]
fn add_item_shows_exactly_one_confirmed_entry() {
    let fixture = Fixture::new();
    let ana = fixture.member("u1", "Ana");
    let service = fixture.service();
    let subscription = service.subscribe(&ana).unwrap();

    let id = service.add_item(&ana, "  Milk ").unwrap();

    let view = service.view().unwrap();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].item.id, id);
    assert_eq!(view[0].item.name, "Milk");
    assert_eq!(view[0].item.added_by_name, "Ana");
    assert_eq!(view[0].state, ItemState::Confirmed);
    assert_eq!(service.pending_count(), 0);
    subscription.unsubscribe();
}

#[test]
fn failed_add_is_rolled_back_and_reported() {
    let fixture = Fixture::new();
    let ana = fixture.member("u1", "Ana");
    let service = fixture.service();
    let subscription = service.subscribe(&ana).unwrap();

    fixture.store.fail_next_writes(
        &fixture.items(),
        1,
        StoreError::Unavailable("offline".to_string()),
    );
    let err = service.add_item(&ana, "Milk").unwrap_err();
    match err {
        CoreError::Write(WriteError::Store { operation, .. }) => assert_eq!(operation, "add item"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(service.view().unwrap().is_empty());
    assert_eq!(service.pending_count(), 0);
    subscription.unsubscribe();
}

#[test]
fn adding_registers_membership_first() {
    let fixture = Fixture::new();
    let ben = fixture.member("u2", "Ben");
    let service = fixture.service();
    service.add_item(&ben, "Eggs").unwrap();

    let member = CollectionPath::household_members(&fixture.household.code)
        .doc("u2")
        .unwrap();
    assert!(fixture.store.get(&member).unwrap().is_some());
}

#[test]
fn toggles_write_all_completion_fields_with_consistent_attribution() {
    let fixture = Fixture::new();
    let ana = fixture.member("u1", "Ana");
    let ben = fixture.member("u2", "Ben");
    let ana_view = fixture.service();
    let ben_view = fixture.service();
    let ana_sub = ana_view.subscribe(&ana).unwrap();
    let ben_sub = ben_view.subscribe(&ben).unwrap();

    let id = ana_view.add_item(&ana, "Milk").unwrap();
    fixture.clock.advance(5_000);
    assert!(ana_view.toggle_completion(&ana, &id).unwrap());

    let seen_by_ben = ben_view.view().unwrap();
    let completion = seen_by_ben[0].item.completion.clone().unwrap();
    assert_eq!(completion.by_id.as_deref(), Some("u1"));
    assert_eq!(completion.by_name, "Ana");
    assert_eq!(completion.at_ms, 6_000);

    // Ben's concurrent completion lands after Ana's: the last commit wins whole.
    let doc = fixture.items().doc(&id).unwrap();
    let late = Completion {
        by_id: Some("u2".to_string()),
        by_name: "Ben".to_string(),
        at_ms: 5_900,
    };
    fixture
        .store
        .update(&doc, encode(&CompletionPatch::from_completion(Some(&late))).unwrap())
        .unwrap();
    for view in [&ana_view, &ben_view] {
        let entry = view.view().unwrap().remove(0);
        assert_eq!(entry.state, ItemState::Completed);
        assert_eq!(entry.item.completion, Some(late.clone()));
    }

    // Toggling again clears every completion field.
    assert!(!ben_view.toggle_completion(&ben, &id).unwrap());
    let stored = fixture.store.get(&doc).unwrap().unwrap();
    assert_eq!(stored.fields["completed"], false);
    assert!(stored.fields["completed_by_id"].is_null());
    assert!(stored.fields["completed_by_name"].is_null());
    assert!(stored.fields["completed_at"].is_null());
    assert_eq!(ana_view.state_of(&id), Some(ItemState::Confirmed));

    ana_sub.unsubscribe();
    ben_sub.unsubscribe();
}

#[test]
fn toggling_missing_item_reports_not_found() {
    let fixture = Fixture::new();
    let ana = fixture.member("u1", "Ana");
    let err = fixture.service().toggle_completion(&ana, "nope").unwrap_err();
    assert!(matches!(err, CoreError::ItemNotFound(id) if id == "nope"));
}

#[test]
fn delete_removes_item_for_every_viewer() {
    let fixture = Fixture::new();
    let ana = fixture.member("u1", "Ana");
    let service = fixture.service();
    let subscription = service.subscribe(&ana).unwrap();

    let milk = service.add_item(&ana, "Milk").unwrap();
    service.add_item(&ana, "Eggs").unwrap();
    assert_eq!(service.unfinished_count(), 2);

    service.delete_item(&ana, &milk).unwrap();
    let names = service
        .view()
        .unwrap()
        .into_iter()
        .map(|entry| entry.item.name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Eggs"]);
    subscription.unsubscribe();
}

#[test]
fn broken_stream_surfaces_read_error_then_recovers() {
    let fixture = Fixture::new();
    let ana = fixture.member("u1", "Ana");
    let service = fixture.service();
    let subscription = service.subscribe(&ana).unwrap();
    service.add_item(&ana, "Milk").unwrap();

    fixture.store.break_stream(
        &fixture.items(),
        StoreError::PermissionDenied("rules".to_string()),
    );
    assert!(service.view().is_err());

    service.refetch(&ana).unwrap();
    assert_eq!(service.view().unwrap().len(), 1);
    subscription.unsubscribe();
}

#[test]
fn unsubscribe_stops_delivery() {
    let fixture = Fixture::new();
    let ana = fixture.member("u1", "Ana");
    let service = fixture.service();
    let subscription = service.subscribe(&ana).unwrap();
    assert_eq!(fixture.store.listener_count(), 1);
    subscription.unsubscribe();
    assert_eq!(fixture.store.listener_count(), 0);

    let writer = fixture.service();
    writer.add_item(&ana, "Milk").unwrap();
    assert!(service.view().unwrap().is_empty());
}

#[test]
fn operations_without_household_fail_fast() {
    let service = Fixture::new().service();
    let loner = session("u9", "Cy");
    assert!(matches!(service.subscribe(&loner), Err(CoreError::NoHousehold)));
    assert!(matches!(
        service.add_item(&loner, "Milk"),
        Err(CoreError::NoHousehold)
    ));
}
