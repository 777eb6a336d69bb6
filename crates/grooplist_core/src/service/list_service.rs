//! Grocery list use-cases.
//!
//! # Responsibility
//! - Bind the household item stream to a `ListReconciler`.
//! - Run add, toggle and delete against the document store.
//!
//! # Invariants
//! - The reconciler lock is never held across a store call; the store may
//!   deliver a snapshot synchronously from inside a write.
//! - Toggles re-read the item from the store and write all completion
//!   fields in one update.
//! - Documents that fail to decode are skipped, never shown half-parsed.

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult, ReadError, WriteError};
use crate::model::item::{Completion, CompletionPatch, GroceryItem, ItemDocument, ItemId};
use crate::reconcile::list::{ItemState, ListEntry, ListReconciler};
use crate::service::membership_service::MembershipService;
use crate::service::session_service::SessionContext;
use crate::store::{encode, CollectionPath, Document, DocumentStore, StoreResult, Subscription};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub struct GroceryListService {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    membership: MembershipService,
    reconciler: Arc<Mutex<ListReconciler>>,
}

impl GroceryListService {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, match_window_ms: i64) -> Self {
        Self {
            membership: MembershipService::new(Arc::clone(&store), Arc::clone(&clock)),
            store,
            clock,
            reconciler: Arc::new(Mutex::new(ListReconciler::new(match_window_ms))),
        }
    }

    /// Starts mirroring the session household's items into the reconciler.
    pub fn subscribe(&self, session: &SessionContext) -> CoreResult<Subscription> {
        let household = session.require_household()?;
        self.lock().clear();

        let reconciler = Arc::clone(&self.reconciler);
        let clock = Arc::clone(&self.clock);
        let subscription = self
            .store
            .subscribe(
                &CollectionPath::household_items(&household.code),
                Box::new(move |delivery| {
                    let mut reconciler = reconciler.lock().unwrap_or_else(PoisonError::into_inner);
                    match delivery {
                        Ok(snapshot) => {
                            reconciler.apply_snapshot(decode_items(&snapshot.documents, clock.now_ms()));
                        }
                        Err(err) => reconciler.fail_stream(err),
                    }
                }),
            )
            .map_err(|err| CoreError::Read(ReadError::from(err)))?;
        info!(
            "event=list_subscribe module=list status=ok code={}",
            household.code
        );
        Ok(subscription)
    }

    /// One-shot read that replaces the confirmed set.
    pub fn refetch(&self, session: &SessionContext) -> CoreResult<()> {
        let household = session.require_household()?;
        match self.store.list(&CollectionPath::household_items(&household.code)) {
            Ok(documents) => {
                let items = decode_items(&documents, self.clock.now_ms());
                self.lock().apply_snapshot(items);
                Ok(())
            }
            Err(err) => {
                self.lock().fail_stream(&err);
                Err(CoreError::Read(ReadError::from(err)))
            }
        }
    }

    /// Adds an item optimistically and returns its authoritative id.
    pub fn add_item(&self, session: &SessionContext, raw_name: &str) -> CoreResult<ItemId> {
        let household = session.require_household()?;
        self.membership.ensure_membership(session)?;

        let pending = self.lock().begin_add(
            raw_name,
            Some(session.user_id()),
            session.member_name(),
            self.clock.now_ms(),
        )?;
        let document = ItemDocument::new_submission(
            &pending.name,
            Some(session.user_id()),
            session.member_name(),
            pending.submitted_at_ms,
        );

        let created = encode(&document).and_then(|fields| {
            self.store
                .create(&CollectionPath::household_items(&household.code), fields)
        });
        match created {
            Ok(remote_id) => {
                self.lock().acknowledge(&pending.local_id, &remote_id);
                debug!("event=list_add module=list status=ok");
                Ok(remote_id)
            }
            Err(err) => {
                self.lock().fail(&pending.local_id);
                warn!("event=list_add module=list status=error error={err}");
                Err(WriteError::store("add item", err).into())
            }
        }
    }

    /// Flips the completion state of an item; returns the new state.
    pub fn toggle_completion(&self, session: &SessionContext, item_id: &str) -> CoreResult<bool> {
        let household = session.require_household()?;
        let items = CollectionPath::household_items(&household.code);
        let path = items
            .doc(item_id)
            .map_err(|_| CoreError::ItemNotFound(item_id.to_string()))?;

        let current = self
            .store
            .get(&path)
            .map_err(|err| CoreError::Read(ReadError::from(err)))?
            .ok_or_else(|| CoreError::ItemNotFound(item_id.to_string()))
            .and_then(|document| decode_item(&document, self.clock.now_ms()))?;

        self.membership.ensure_membership(session)?;
        let completion = (!current.completed()).then(|| Completion {
            by_id: Some(session.user_id().to_string()),
            by_name: session.member_name().to_string(),
            at_ms: self.clock.now_ms(),
        });
        let completed = completion.is_some();
        encode(&CompletionPatch::from_completion(completion.as_ref()))
            .and_then(|fields| self.store.update(&path, fields))
            .map_err(|err| {
                warn!("event=list_toggle module=list status=error error={err}");
                WriteError::store("update item", err)
            })?;
        debug!("event=list_toggle module=list status=ok completed={completed}");
        Ok(completed)
    }

    /// Deletes a confirmed item, or drops a pending one locally.
    pub fn delete_item(&self, session: &SessionContext, item_id: &str) -> CoreResult<()> {
        let household = session.require_household()?;
        if self.lock().state_of(item_id) == Some(ItemState::Pending) {
            self.lock().supersede(item_id);
            return Ok(());
        }
        self.membership.ensure_membership(session)?;
        let result: StoreResult<()> = CollectionPath::household_items(&household.code)
            .doc(item_id)
            .and_then(|path| self.store.delete(&path));
        result.map_err(|err| {
            warn!("event=list_delete module=list status=error error={err}");
            WriteError::store("delete item", err)
        })?;
        debug!("event=list_delete module=list status=ok");
        Ok(())
    }

    /// Reconciled list, or the stream failure.
    pub fn view(&self) -> Result<Vec<ListEntry>, ReadError> {
        self.lock().view()
    }

    pub fn state_of(&self, item_id: &str) -> Option<ItemState> {
        self.lock().state_of(item_id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending_count()
    }

    pub fn unfinished_count(&self) -> usize {
        self.lock().unfinished_count()
    }

    fn lock(&self) -> MutexGuard<'_, ListReconciler> {
        self.reconciler.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn decode_item(document: &Document, now_ms: i64) -> CoreResult<GroceryItem> {
    let decoded = document
        .decode::<ItemDocument>()
        .map_err(|err| CoreError::Read(ReadError::from(err)))?;
    decoded
        .into_item(document.id.clone(), now_ms)
        .map_err(|err| CoreError::Read(ReadError::new(err.to_string())))
}

fn decode_items(documents: &[Document], now_ms: i64) -> Vec<GroceryItem> {
    documents
        .iter()
        .filter_map(|document| match decode_item(document, now_ms) {
            Ok(item) => Some(item),
            Err(err) => {
                warn!("event=list_decode module=list status=skipped error={err}");
                None
            }
        })
        .collect()
}
