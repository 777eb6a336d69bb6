//! Household notification records.
//!
//! # Invariants
//! - Records are append-only; reading never deletes.
//! - Read state is per user, tracked by membership in `read_by`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A member is near a point of interest.
    Proximity,
    /// Any other household message.
    General,
}

/// Content of a notification before the store assigns identity and time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub user_id: Option<String>,
    pub store_name: Option<String>,
}

impl NotificationDraft {
    pub fn general(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::General,
            title: title.into(),
            message: message.into(),
            user_id: None,
            store_name: None,
        }
    }

    pub(crate) fn into_document(self, created_at_ms: i64) -> NotificationDocument {
        NotificationDocument {
            kind: self.kind,
            title: self.title,
            message: self.message,
            created_at: Some(created_at_ms),
            read_by: Vec::new(),
            user_id: self.user_id,
            store_name: self.store_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub created_at_ms: i64,
    pub read_by: BTreeSet<String>,
    pub user_id: Option<String>,
    pub store_name: Option<String>,
}

impl NotificationRecord {
    pub fn is_read_by(&self, user_id: &str) -> bool {
        self.read_by.contains(user_id)
    }
}

/// Number of records `user_id` has not read yet.
pub fn unread_count(records: &[NotificationRecord], user_id: &str) -> usize {
    records
        .iter()
        .filter(|record| !record.is_read_by(user_id))
        .count()
}

/// Remote document shape of `households/{code}/notifications/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDocument {
    pub kind: NotificationKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub read_by: Vec<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub store_name: Option<String>,
}

impl NotificationDocument {
    pub fn into_record(self, id: impl Into<String>, fallback_now_ms: i64) -> NotificationRecord {
        NotificationRecord {
            id: id.into(),
            kind: self.kind,
            title: self.title,
            message: self.message,
            created_at_ms: self.created_at.unwrap_or(fallback_now_ms),
            read_by: self.read_by.into_iter().collect(),
            user_id: self.user_id,
            store_name: self.store_name,
        }
    }
}
