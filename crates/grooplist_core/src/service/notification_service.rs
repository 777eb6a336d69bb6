//! Household notifications and device alerts.
//!
//! # Responsibility
//! - Persist notification records under `households/{code}/notifications`.
//! - Render a device alert for each delivered notification while alerts
//!   are enabled and permission is granted.
//! - Mirror the notification stream newest first for the bell view.
//!
//! # Invariants
//! - New records start with an empty `read_by`.
//! - Permission refusal leaves alerts off and is reported as an outcome,
//!   never as an error.

use crate::clock::Clock;
use crate::error::{CoreResult, ReadError, WriteError};
use crate::model::household::{HouseholdCode, PushTokenDocument};
use crate::model::notification::{
    unread_count, NotificationDocument, NotificationDraft, NotificationRecord,
};
use crate::service::session_service::SessionContext;
use crate::store::{
    encode, CollectionPath, CollectionSnapshot, DocumentStore, SetMode, StoreResult, Subscription,
};
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

pub const ALERTS_ENABLED_TITLE: &str = "Notifications enabled!";
pub const ALERTS_ENABLED_MESSAGE: &str =
    "You'll now receive alerts when group members are near grocery stores.";

/// Receiver of household notifications raised by the core.
pub trait NotificationSink {
    fn deliver(&self, session: &SessionContext, draft: NotificationDraft) -> CoreResult<()>;
}

/// Device notification permission as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not decided yet; a prompt may still be shown.
    Prompt,
    Unsupported,
}

/// Host hook that asks the user for notification permission.
pub trait PermissionPrompt {
    fn current(&self) -> PermissionState;
    fn request(&self) -> PermissionState;
}

/// Host hook that shows a native alert.
pub trait AlertPresenter: Send + Sync {
    fn present(&self, title: &str, message: &str);
}

/// Result of `enable_alerts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertsOutcome {
    Enabled,
    PermissionDenied,
    Unsupported,
}

/// Notification sink backed by the household document store.
pub struct HouseholdNotifications {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    presenter: Arc<dyn AlertPresenter>,
    alerts_enabled: bool,
}

impl HouseholdNotifications {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        presenter: Arc<dyn AlertPresenter>,
    ) -> Self {
        Self {
            store,
            clock,
            presenter,
            alerts_enabled: false,
        }
    }

    pub fn alerts_enabled(&self) -> bool {
        self.alerts_enabled
    }

    /// Turns device alerts on after asking for permission if needed.
    pub fn enable_alerts(
        &mut self,
        session: &SessionContext,
        prompt: &dyn PermissionPrompt,
    ) -> CoreResult<AlertsOutcome> {
        let permission = match prompt.current() {
            PermissionState::Prompt => prompt.request(),
            decided => decided,
        };
        match permission {
            PermissionState::Granted => {
                self.alerts_enabled = true;
                info!("event=alerts_enable module=notifications status=ok");
                self.deliver(
                    session,
                    NotificationDraft::general(ALERTS_ENABLED_TITLE, ALERTS_ENABLED_MESSAGE),
                )?;
                Ok(AlertsOutcome::Enabled)
            }
            PermissionState::Unsupported => {
                info!("event=alerts_enable module=notifications status=unsupported");
                Ok(AlertsOutcome::Unsupported)
            }
            PermissionState::Denied | PermissionState::Prompt => {
                info!("event=alerts_enable module=notifications status=denied");
                Ok(AlertsOutcome::PermissionDenied)
            }
        }
    }

    pub fn disable_alerts(&mut self) {
        self.alerts_enabled = false;
    }

    /// Adds `session`'s user to the readers of one notification.
    pub fn mark_read(&self, session: &SessionContext, notification_id: &str) -> CoreResult<()> {
        let household = session.require_household()?;
        let path = CollectionPath::household_notifications(&household.code)
            .doc(notification_id)
            .map_err(|err| WriteError::store("mark notification read", err))?;
        self.store
            .array_union(
                &path,
                "read_by",
                vec![Value::String(session.user_id().to_string())],
            )
            .map_err(|err| {
                warn!("event=notification_read module=notifications status=error error={err}");
                WriteError::store("mark notification read", err)
            })?;
        Ok(())
    }

    /// Marks every record not yet read by the session user.
    pub fn mark_all_read(
        &self,
        session: &SessionContext,
        records: &[NotificationRecord],
    ) -> CoreResult<usize> {
        let mut marked = 0;
        for record in records
            .iter()
            .filter(|record| !record.is_read_by(session.user_id()))
        {
            self.mark_read(session, &record.id)?;
            marked += 1;
        }
        Ok(marked)
    }

    /// Stores a device push token under the session user's member record.
    pub fn register_push_token(&self, session: &SessionContext, token: &str) -> CoreResult<()> {
        let household = session.require_household()?;
        let path = CollectionPath::member_tokens(&household.code, session.user_id())
            .and_then(|collection| collection.doc(token))
            .map_err(|err| WriteError::store("register push token", err))?;
        let document = PushTokenDocument {
            token: token.to_string(),
            updated_at: self.clock.now_ms(),
        };
        let fields =
            encode(&document).map_err(|err| WriteError::store("register push token", err))?;
        self.store
            .set(&path, fields, SetMode::Merge)
            .map_err(|err| WriteError::store("register push token", err))?;
        info!("event=push_token_register module=notifications status=ok");
        Ok(())
    }
}

impl NotificationSink for HouseholdNotifications {
    fn deliver(&self, session: &SessionContext, draft: NotificationDraft) -> CoreResult<()> {
        let household = session.require_household()?;
        let title = draft.title.clone();
        let message = draft.message.clone();
        let kind = draft.kind;
        let fields = encode(&draft.into_document(self.clock.now_ms()))
            .map_err(|err| WriteError::store("send notification", err))?;
        self.store
            .create(
                &CollectionPath::household_notifications(&household.code),
                fields,
            )
            .map_err(|err| {
                warn!("event=notification_send module=notifications status=error error={err}");
                WriteError::store("send notification", err)
            })?;
        debug!("event=notification_send module=notifications status=ok kind={kind:?}");

        if self.alerts_enabled {
            self.presenter.present(&title, &message);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct FeedState {
    records: Vec<NotificationRecord>,
    error: Option<ReadError>,
}

/// Live mirror of a household's notifications, newest first.
#[derive(Clone)]
pub struct NotificationFeed {
    state: Arc<Mutex<FeedState>>,
    clock: Arc<dyn Clock>,
}

impl NotificationFeed {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FeedState::default())),
            clock,
        }
    }

    /// Starts mirroring `households/{code}/notifications`.
    pub fn attach(
        &self,
        store: &dyn DocumentStore,
        code: &HouseholdCode,
    ) -> StoreResult<Subscription> {
        let state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);
        store.subscribe(
            &CollectionPath::household_notifications(code),
            Box::new(move |delivery| {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                match delivery {
                    Ok(snapshot) => {
                        state.records = decode_records(snapshot, clock.now_ms());
                        state.error = None;
                    }
                    Err(err) => {
                        warn!("event=notification_stream module=notifications status=error error={err}");
                        state.error = Some(ReadError::from(err.clone()));
                    }
                }
            }),
        )
    }

    pub fn records(&self) -> Result<Vec<NotificationRecord>, ReadError> {
        let state = self.lock();
        match &state.error {
            Some(err) => Err(err.clone()),
            None => Ok(state.records.clone()),
        }
    }

    pub fn unread_count(&self, user_id: &str) -> usize {
        unread_count(&self.lock().records, user_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn decode_records(snapshot: &CollectionSnapshot, now_ms: i64) -> Vec<NotificationRecord> {
    let mut records = snapshot
        .documents
        .iter()
        .filter_map(|document| match document.decode::<NotificationDocument>() {
            Ok(decoded) => Some(decoded.into_record(document.id.clone(), now_ms)),
            Err(err) => {
                warn!("event=notification_decode module=notifications status=skipped error={err}");
                None
            }
        })
        .collect::<Vec<_>>();
    records.sort_by(|a, b| {
        b.created_at_ms
            .cmp(&a.created_at_ms)
            .then_with(|| a.id.cmp(&b.id))
    });
    records
}
