//! Remote document store contract.
//!
//! # Responsibility
//! - Describe the hierarchical collections the household app reads and
//!   writes (`households/{code}/items`, `/members`, `/locations`,
//!   `/notifications`, `users/{uid}/households`).
//! - Define point reads, collection reads, writes and realtime
//!   subscriptions independent of any storage engine.
//!
//! # Invariants
//! - Within one subscription, snapshots arrive in commit order.
//! - No ordering is promised across different subscriptions.
//! - A `Subscription` is cancelled only by `unsubscribe()`; dropping the
//!   handle keeps the listener registered.

use crate::model::household::HouseholdCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod memory;

pub use memory::InMemoryDocumentStore;

/// Document fields as stored remotely.
pub type Fields = Map<String, Value>;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by a document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend unreachable or the request timed out.
    Unavailable(String),
    /// Security rules rejected the request.
    PermissionDenied(String),
    /// Target document does not exist (field updates only).
    NotFound(String),
    /// A path segment is empty or contains `/`.
    InvalidPath(String),
    /// Document fields do not match the expected shape.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "document store unavailable: {message}"),
            Self::PermissionDenied(message) => write!(f, "permission denied: {message}"),
            Self::NotFound(path) => write!(f, "document not found: {path}"),
            Self::InvalidPath(path) => write!(f, "invalid document path: {path}"),
            Self::InvalidData(message) => write!(f, "invalid document data: {message}"),
        }
    }
}

impl Error for StoreError {}

/// Path of a collection, e.g. `households/AB12CD/items`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    fn from_segments(segments: &[&str]) -> StoreResult<Self> {
        let joined = segments.join("/");
        if segments
            .iter()
            .any(|segment| segment.is_empty() || segment.contains('/'))
        {
            return Err(StoreError::InvalidPath(joined));
        }
        Ok(Self(joined))
    }

    pub fn households() -> Self {
        Self("households".to_string())
    }

    pub fn household_items(code: &HouseholdCode) -> Self {
        Self(format!("households/{code}/items"))
    }

    pub fn household_members(code: &HouseholdCode) -> Self {
        Self(format!("households/{code}/members"))
    }

    pub fn household_locations(code: &HouseholdCode) -> Self {
        Self(format!("households/{code}/locations"))
    }

    pub fn household_notifications(code: &HouseholdCode) -> Self {
        Self(format!("households/{code}/notifications"))
    }

    pub fn user_households(user_id: &str) -> StoreResult<Self> {
        Self::from_segments(&["users", user_id, "households"])
    }

    pub fn member_tokens(code: &HouseholdCode, user_id: &str) -> StoreResult<Self> {
        Self::from_segments(&["households", code.as_str(), "members", user_id, "tokens"])
    }

    /// Path of the document `id` inside this collection.
    pub fn doc(&self, id: &str) -> StoreResult<DocPath> {
        if id.is_empty() || id.contains('/') {
            return Err(StoreError::InvalidPath(format!("{}/{id}", self.0)));
        }
        Ok(DocPath {
            collection: self.clone(),
            id: id.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CollectionPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path of one document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocPath {
    collection: CollectionPath,
    id: String,
}

impl DocPath {
    pub fn household(code: &HouseholdCode) -> Self {
        Self {
            collection: CollectionPath::households(),
            id: code.as_str().to_string(),
        }
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Display for DocPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// One stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    /// Decodes the fields into a typed document shape.
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        serde_json::from_value(Value::Object(self.fields.clone()))
            .map_err(|err| StoreError::InvalidData(format!("document {}: {err}", self.id)))
    }
}

/// Encodes a typed document shape into store fields.
pub fn encode<T: Serialize>(value: &T) -> StoreResult<Fields> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(StoreError::InvalidData(format!(
            "expected an object document, got {other}"
        ))),
        Err(err) => Err(StoreError::InvalidData(err.to_string())),
    }
}

/// Full current view of one collection, delivered by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot {
    pub path: CollectionPath,
    pub documents: Vec<Document>,
}

/// Write semantics for `DocumentStore::set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Overwrite the whole document.
    Replace,
    /// Upsert: create if missing, otherwise overwrite only the given fields.
    Merge,
}

/// Callback invoked with every snapshot (or stream failure) of a collection.
pub type SnapshotListener = Box<dyn FnMut(Result<&CollectionSnapshot, &StoreError>) + Send>;

/// Handle of an active realtime subscription.
#[must_use = "a subscription stays registered until `unsubscribe` is called"]
pub struct Subscription {
    path: CollectionPath,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(path: CollectionPath, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            path,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn path(&self) -> &CollectionPath {
        &self.path
    }

    /// Stops delivery. Snapshots already queued for this listener are dropped.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Remote document store operations used by the household core.
pub trait DocumentStore: Send + Sync {
    fn get(&self, path: &DocPath) -> StoreResult<Option<Document>>;
    fn list(&self, path: &CollectionPath) -> StoreResult<Vec<Document>>;
    /// Creates a document with a store-assigned id and returns that id.
    fn create(&self, path: &CollectionPath, fields: Fields) -> StoreResult<String>;
    fn set(&self, path: &DocPath, fields: Fields, mode: SetMode) -> StoreResult<()>;
    /// Overwrites the given fields of an existing document.
    fn update(&self, path: &DocPath, fields: Fields) -> StoreResult<()>;
    /// Adds `values` to the array `field`, skipping values already present.
    fn array_union(&self, path: &DocPath, field: &str, values: Vec<Value>) -> StoreResult<()>;
    /// Deletes a document. Deleting a missing document succeeds.
    fn delete(&self, path: &DocPath) -> StoreResult<()>;
    fn subscribe(
        &self,
        path: &CollectionPath,
        listener: SnapshotListener,
    ) -> StoreResult<Subscription>;
}
