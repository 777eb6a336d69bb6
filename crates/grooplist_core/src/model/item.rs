//! Grocery item domain model.
//!
//! # Responsibility
//! - Define the canonical grocery item record shown in a household list.
//! - Map between the remote document field shape and the domain record.
//!
//! # Invariants
//! - `id` is unique within one household list.
//! - Completion attribution exists if and only if the item is completed;
//!   this is structural (`completion: Option<Completion>`).
//! - Remote documents with half-written completion fields are rejected.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Item identity. Remote ids are assigned by the document store; local
/// placeholders use the `temp-` prefix.
pub type ItemId = String;

/// Prefix carried by placeholder ids of optimistic items.
pub const PLACEHOLDER_ID_PREFIX: &str = "temp-";

/// Upper bound for item names, counted in chars.
pub const MAX_ITEM_NAME_CHARS: usize = 200;

/// Validation errors for grocery items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemValidationError {
    /// Item name is empty after trimming.
    EmptyName,
    /// Item name exceeds `MAX_ITEM_NAME_CHARS`.
    NameTooLong { max: usize },
    /// Completion flag and attribution fields disagree.
    InconsistentCompletion(String),
}

impl Display for ItemValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "item name cannot be empty"),
            Self::NameTooLong { max } => write!(f, "item name exceeds {max} characters"),
            Self::InconsistentCompletion(item_id) => {
                write!(f, "item {item_id} has inconsistent completion fields")
            }
        }
    }
}

impl Error for ItemValidationError {}

/// Who completed an item and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub by_id: Option<String>,
    pub by_name: String,
    /// Unix epoch milliseconds.
    pub at_ms: i64,
}

/// One entry of a household grocery list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroceryItem {
    pub id: ItemId,
    pub name: String,
    pub added_by_id: Option<String>,
    pub added_by_name: String,
    /// Authoritative creation time in epoch milliseconds.
    pub added_at_ms: i64,
    /// Creation time as observed by the submitting client.
    pub added_at_client_ms: Option<i64>,
    pub completion: Option<Completion>,
}

impl GroceryItem {
    pub fn completed(&self) -> bool {
        self.completion.is_some()
    }

    pub fn is_placeholder(&self) -> bool {
        self.id.starts_with(PLACEHOLDER_ID_PREFIX)
    }

    pub fn validate(&self) -> Result<(), ItemValidationError> {
        validate_item_name(&self.name)?;
        Ok(())
    }

    /// List order: creation time ascending, ties broken by id.
    pub fn list_order(&self, other: &Self) -> Ordering {
        self.added_at_ms
            .cmp(&other.added_at_ms)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Trims and validates a user-entered item name.
pub fn normalize_item_name(raw: &str) -> Result<String, ItemValidationError> {
    let trimmed = raw.trim();
    validate_item_name(trimmed)?;
    Ok(trimmed.to_string())
}

fn validate_item_name(name: &str) -> Result<(), ItemValidationError> {
    if name.trim().is_empty() {
        return Err(ItemValidationError::EmptyName);
    }
    if name.chars().count() > MAX_ITEM_NAME_CHARS {
        return Err(ItemValidationError::NameTooLong {
            max: MAX_ITEM_NAME_CHARS,
        });
    }
    Ok(())
}

/// Remote document shape of `households/{code}/items/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub added_by_id: Option<String>,
    #[serde(default)]
    pub added_by_name: String,
    #[serde(default)]
    pub added_at: Option<i64>,
    #[serde(default)]
    pub added_at_client: Option<i64>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_by_id: Option<String>,
    #[serde(default)]
    pub completed_by_name: Option<String>,
    #[serde(default)]
    pub completed_at: Option<i64>,
}

impl ItemDocument {
    /// Builds the document written by a new add request.
    pub fn new_submission(
        name: &str,
        added_by_id: Option<&str>,
        added_by_name: &str,
        submitted_at_ms: i64,
    ) -> Self {
        Self {
            name: name.to_string(),
            added_by_id: added_by_id.map(str::to_string),
            added_by_name: added_by_name.to_string(),
            added_at: Some(submitted_at_ms),
            added_at_client: Some(submitted_at_ms),
            completed: false,
            completed_by_id: None,
            completed_by_name: None,
            completed_at: None,
        }
    }

    /// Converts into the domain record.
    ///
    /// A missing `added_at` (server timestamp not yet resolved) falls back to
    /// the client time, then to `fallback_now_ms`.
    pub fn into_item(
        self,
        id: impl Into<ItemId>,
        fallback_now_ms: i64,
    ) -> Result<GroceryItem, ItemValidationError> {
        let id = id.into();
        let added_at_ms = self
            .added_at
            .or(self.added_at_client)
            .unwrap_or(fallback_now_ms);

        let completion = match (self.completed, self.completed_by_name) {
            (true, Some(by_name)) => Some(Completion {
                by_id: self.completed_by_id,
                by_name,
                at_ms: self.completed_at.unwrap_or(fallback_now_ms),
            }),
            (false, None) if self.completed_at.is_none() && self.completed_by_id.is_none() => {
                None
            }
            _ => return Err(ItemValidationError::InconsistentCompletion(id)),
        };

        let item = GroceryItem {
            id,
            name: self.name,
            added_by_id: self.added_by_id,
            added_by_name: self.added_by_name,
            added_at_ms,
            added_at_client_ms: self.added_at_client,
            completion,
        };
        item.validate()?;
        Ok(item)
    }
}

/// Field patch that sets or clears all completion fields in one write.
///
/// `None` serializes as explicit `null` so a clear overwrites stale values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionPatch {
    pub completed: bool,
    pub completed_by_id: Option<String>,
    pub completed_by_name: Option<String>,
    pub completed_at: Option<i64>,
}

impl CompletionPatch {
    pub fn from_completion(completion: Option<&Completion>) -> Self {
        match completion {
            Some(completion) => Self {
                completed: true,
                completed_by_id: completion.by_id.clone(),
                completed_by_name: Some(completion.by_name.clone()),
                completed_at: Some(completion.at_ms),
            },
            None => Self {
                completed: false,
                completed_by_id: None,
                completed_by_name: None,
                completed_at: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_item_name, CompletionPatch, ItemDocument, ItemValidationError};

    #[test]
    fn normalize_item_name_trims_and_rejects_empty() {
        assert_eq!(normalize_item_name("  milk ").unwrap(), "milk");
        assert_eq!(
            normalize_item_name("   ").unwrap_err(),
            ItemValidationError::EmptyName
        );
    }

    #[test]
    fn document_without_server_time_falls_back_to_client_time() {
        let mut doc = ItemDocument::new_submission("eggs", Some("u1"), "Ana", 1_000);
        doc.added_at = None;
        let item = doc.into_item("abc", 9_999).unwrap();
        assert_eq!(item.added_at_ms, 1_000);
        assert!(!item.completed());
    }

    #[test]
    fn completed_document_without_name_is_rejected() {
        let mut doc = ItemDocument::new_submission("eggs", None, "Ana", 1_000);
        doc.completed = true;
        let err = doc.into_item("abc", 0).unwrap_err();
        assert!(matches!(err, ItemValidationError::InconsistentCompletion(_)));
    }

    #[test]
    fn open_document_with_leftover_attribution_is_rejected() {
        let mut doc = ItemDocument::new_submission("eggs", None, "Ana", 1_000);
        doc.completed_by_name = Some("Ben".to_string());
        assert!(doc.into_item("abc", 0).is_err());
    }

    #[test]
    fn open_document_with_leftover_completer_id_is_rejected() {
        let mut doc = ItemDocument::new_submission("eggs", Some("u1"), "Ana", 1_000);
        doc.completed_by_id = Some("u2".to_string());
        let err = doc.into_item("abc", 0).unwrap_err();
        assert!(matches!(err, ItemValidationError::InconsistentCompletion(_)));
    }

    #[test]
    fn clearing_patch_writes_explicit_nulls() {
        let value = serde_json::to_value(CompletionPatch::from_completion(None)).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 4);
        assert!(object["completed_by_name"].is_null());
        assert!(object["completed_at"].is_null());
    }
}
