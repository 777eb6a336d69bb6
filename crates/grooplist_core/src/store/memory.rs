//! In-process `DocumentStore` used by tests, the CLI and offline hosts.
//!
//! # Responsibility
//! - Keep documents in ordered maps keyed by collection path.
//! - Deliver a full collection snapshot to every listener after each
//!   committed write, starting with an initial snapshot on subscribe.
//! - Allow tests to inject write and stream failures.
//!
//! # Invariants
//! - Deliveries are queued and drained outside the state lock, so a
//!   listener may write back into the store; nested writes are delivered
//!   after the current delivery returns, preserving commit order.
//! - Failed writes leave state untouched and deliver nothing.

use super::{
    CollectionPath, CollectionSnapshot, DocPath, Document, DocumentStore, Fields, SetMode,
    SnapshotListener, StoreError, StoreResult, Subscription,
};
use log::{debug, warn};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

type SharedListener = Arc<Mutex<SnapshotListener>>;

struct ListenerEntry {
    path: CollectionPath,
    callback: SharedListener,
}

#[derive(Default)]
struct Inner {
    collections: BTreeMap<CollectionPath, BTreeMap<String, Fields>>,
    listeners: BTreeMap<u64, ListenerEntry>,
    next_listener_id: u64,
    injected_write_failures: BTreeMap<CollectionPath, VecDeque<StoreError>>,
    queue: VecDeque<(u64, Result<CollectionSnapshot, StoreError>)>,
    delivering: bool,
}

impl Inner {
    fn snapshot(&self, path: &CollectionPath) -> CollectionSnapshot {
        let documents = self
            .collections
            .get(path)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        CollectionSnapshot {
            path: path.clone(),
            documents,
        }
    }

    fn enqueue_snapshots(&mut self, path: &CollectionPath) {
        let targets = self
            .listeners
            .iter()
            .filter(|(_, entry)| &entry.path == path)
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        if targets.is_empty() {
            return;
        }
        let snapshot = self.snapshot(path);
        for id in targets {
            self.queue.push_back((id, Ok(snapshot.clone())));
        }
    }

    fn take_injected_failure(&mut self, path: &CollectionPath) -> StoreResult<()> {
        match self
            .injected_write_failures
            .get_mut(path)
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Thread-safe in-memory document store.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` writes into `path` fail with `err` before
    /// touching state.
    pub fn fail_next_writes(&self, path: &CollectionPath, count: usize, err: StoreError) {
        let mut inner = self.lock();
        let queue = inner
            .injected_write_failures
            .entry(path.clone())
            .or_default();
        for _ in 0..count {
            queue.push_back(err.clone());
        }
    }

    /// Delivers `err` to every listener of `path`, as a broken stream would.
    pub fn break_stream(&self, path: &CollectionPath, err: StoreError) {
        {
            let mut inner = self.lock();
            let targets = inner
                .listeners
                .iter()
                .filter(|(_, entry)| &entry.path == path)
                .map(|(id, _)| *id)
                .collect::<Vec<_>>();
            for id in targets {
                inner.queue.push_back((id, Err(err.clone())));
            }
        }
        self.drain();
    }

    /// Number of registered listeners across all collections.
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(
        &self,
        path: &CollectionPath,
        mutate: impl FnOnce(&mut BTreeMap<String, Fields>) -> StoreResult<()>,
    ) -> StoreResult<()> {
        {
            let mut inner = self.lock();
            inner.take_injected_failure(path)?;
            let collection = inner.collections.entry(path.clone()).or_default();
            mutate(collection)?;
            inner.enqueue_snapshots(path);
        }
        self.drain();
        Ok(())
    }

    fn drain(&self) {
        {
            let mut inner = self.lock();
            if inner.delivering {
                return;
            }
            inner.delivering = true;
        }

        loop {
            let next = {
                let mut inner = self.lock();
                match inner.queue.pop_front() {
                    Some((id, payload)) => inner
                        .listeners
                        .get(&id)
                        .map(|entry| (Arc::clone(&entry.callback), payload)),
                    None => {
                        inner.delivering = false;
                        break;
                    }
                }
            };

            if let Some((callback, payload)) = next {
                let mut guard = callback.lock().unwrap_or_else(PoisonError::into_inner);
                let listener: &mut SnapshotListener = &mut guard;
                listener(payload.as_ref());
            }
        }
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        let inner = self.lock();
        Ok(inner
            .collections
            .get(path.collection())
            .and_then(|docs| docs.get(path.id()))
            .map(|fields| Document {
                id: path.id().to_string(),
                fields: fields.clone(),
            }))
    }

    fn list(&self, path: &CollectionPath) -> StoreResult<Vec<Document>> {
        Ok(self.lock().snapshot(path).documents)
    }

    fn create(&self, path: &CollectionPath, fields: Fields) -> StoreResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        let created = id.clone();
        self.write(path, move |docs| {
            docs.insert(created, fields);
            Ok(())
        })?;
        debug!("event=doc_create module=store status=ok collection={path}");
        Ok(id)
    }

    fn set(&self, path: &DocPath, fields: Fields, mode: SetMode) -> StoreResult<()> {
        let id = path.id().to_string();
        self.write(path.collection(), move |docs| {
            match mode {
                SetMode::Replace => {
                    docs.insert(id, fields);
                }
                SetMode::Merge => {
                    docs.entry(id).or_default().extend(fields);
                }
            }
            Ok(())
        })
    }

    fn update(&self, path: &DocPath, fields: Fields) -> StoreResult<()> {
        let id = path.id().to_string();
        let display = path.to_string();
        self.write(path.collection(), move |docs| match docs.get_mut(&id) {
            Some(existing) => {
                existing.extend(fields);
                Ok(())
            }
            None => Err(StoreError::NotFound(display)),
        })
    }

    fn array_union(&self, path: &DocPath, field: &str, values: Vec<Value>) -> StoreResult<()> {
        let id = path.id().to_string();
        let display = path.to_string();
        self.write(path.collection(), move |docs| {
            let existing = docs
                .get_mut(&id)
                .ok_or_else(|| StoreError::NotFound(display.clone()))?;
            let slot = existing
                .entry(field.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if slot.is_null() {
                *slot = Value::Array(Vec::new());
            }
            let array = slot.as_array_mut().ok_or_else(|| {
                StoreError::InvalidData(format!("field `{field}` of {display} is not an array"))
            })?;
            for value in values {
                if !array.contains(&value) {
                    array.push(value);
                }
            }
            Ok(())
        })
    }

    fn delete(&self, path: &DocPath) -> StoreResult<()> {
        let id = path.id().to_string();
        self.write(path.collection(), move |docs| {
            docs.remove(&id);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        path: &CollectionPath,
        listener: SnapshotListener,
    ) -> StoreResult<Subscription> {
        let id = {
            let mut inner = self.lock();
            let id = inner.next_listener_id;
            inner.next_listener_id += 1;
            inner.listeners.insert(
                id,
                ListenerEntry {
                    path: path.clone(),
                    callback: Arc::new(Mutex::new(listener)),
                },
            );
            let initial = inner.snapshot(path);
            inner.queue.push_back((id, Ok(initial)));
            id
        };
        self.drain();
        debug!("event=subscribe module=store status=ok collection={path} listener_id={id}");

        let weak = Arc::downgrade(&self.inner);
        let unsubscribed_path = path.clone();
        Ok(Subscription::new(path.clone(), move || {
            match weak.upgrade() {
                Some(inner) => {
                    let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
                    inner.listeners.remove(&id);
                    inner.queue.retain(|(queued, _)| *queued != id);
                }
                None => warn!(
                    "event=unsubscribe module=store status=skipped reason=store_dropped collection={unsubscribed_path}"
                ),
            }
        }))
    }
}
