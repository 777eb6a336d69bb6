//! Deterministic stand-ins for host capabilities.
//!
//! Compiled for unit tests and behind the `testing` feature, which the
//! integration tests enable. None of these types touch real devices or
//! networks.

use crate::error::{AuthError, CoreResult, PositioningError};
use crate::model::geo::Location;
use crate::model::notification::NotificationDraft;
use crate::service::location_service::{PositionOptions, PositioningSensor};
use crate::service::notification_service::{
    AlertPresenter, NotificationSink, PermissionPrompt, PermissionState,
};
use crate::service::session_service::{Identity, IdentityProvider, SessionContext};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sensor that replays queued results, then reports `Unavailable`.
#[derive(Debug, Default)]
pub struct ScriptedSensor {
    script: Mutex<VecDeque<Result<Location, PositioningError>>>,
    requests: Mutex<Vec<PositionOptions>>,
}

impl ScriptedSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: Result<Location, PositioningError>) {
        lock(&self.script).push_back(result);
    }

    pub fn push_fix(&self, latitude: f64, longitude: f64, captured_at_ms: i64) {
        self.push(Ok(Location {
            latitude,
            longitude,
            captured_at_ms,
        }));
    }

    /// Options received by every request so far.
    pub fn requests(&self) -> Vec<PositionOptions> {
        lock(&self.requests).clone()
    }
}

impl PositioningSensor for ScriptedSensor {
    fn current_position(&self, options: &PositionOptions) -> Result<Location, PositioningError> {
        lock(&self.requests).push(*options);
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(PositioningError::Unavailable("script exhausted".to_string())))
    }
}

/// Sink that keeps every delivered draft.
#[derive(Debug, Default)]
pub struct RecordingSink {
    drafts: Mutex<Vec<NotificationDraft>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drafts(&self) -> Vec<NotificationDraft> {
        lock(&self.drafts).clone()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, _session: &SessionContext, draft: NotificationDraft) -> CoreResult<()> {
        lock(&self.drafts).push(draft);
        Ok(())
    }
}

/// Presenter that records `(title, message)` pairs.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    alerts: Mutex<Vec<(String, String)>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<(String, String)> {
        lock(&self.alerts).clone()
    }
}

impl AlertPresenter for RecordingPresenter {
    fn present(&self, title: &str, message: &str) {
        lock(&self.alerts).push((title.to_string(), message.to_string()));
    }
}

/// Permission prompt with a fixed answer.
#[derive(Debug)]
pub struct FixedPermission {
    current: PermissionState,
    answer: PermissionState,
    prompted: Mutex<u32>,
}

impl FixedPermission {
    /// Undecided permission that resolves to `answer` when asked.
    pub fn answering(answer: PermissionState) -> Self {
        Self {
            current: PermissionState::Prompt,
            answer,
            prompted: Mutex::new(0),
        }
    }

    /// Permission already decided as `state`.
    pub fn decided(state: PermissionState) -> Self {
        Self {
            current: state,
            answer: state,
            prompted: Mutex::new(0),
        }
    }

    pub fn prompt_count(&self) -> u32 {
        *lock(&self.prompted)
    }
}

impl PermissionPrompt for FixedPermission {
    fn current(&self) -> PermissionState {
        self.current
    }

    fn request(&self) -> PermissionState {
        *lock(&self.prompted) += 1;
        self.answer
    }
}

/// Identity provider with a scripted sign-in result.
#[derive(Debug)]
pub struct FakeIdentityProvider {
    next: Mutex<Result<Identity, AuthError>>,
    signed_in: Mutex<Option<Identity>>,
}

impl FakeIdentityProvider {
    pub fn signing_in(user_id: &str, display_name: Option<&str>) -> Self {
        Self {
            next: Mutex::new(Ok(Identity {
                user_id: user_id.to_string(),
                display_name: display_name.map(str::to_string),
            })),
            signed_in: Mutex::new(None),
        }
    }

    pub fn failing(err: AuthError) -> Self {
        Self {
            next: Mutex::new(Err(err)),
            signed_in: Mutex::new(None),
        }
    }

    /// Provider that already holds an authenticated identity.
    pub fn already_signed_in(user_id: &str, display_name: Option<&str>) -> Self {
        let provider = Self::signing_in(user_id, display_name);
        let identity = lock(&provider.next).clone().ok();
        *lock(&provider.signed_in) = identity;
        provider
    }
}

impl IdentityProvider for FakeIdentityProvider {
    fn sign_in(&self) -> Result<Identity, AuthError> {
        let result = lock(&self.next).clone();
        if let Ok(identity) = &result {
            *lock(&self.signed_in) = Some(identity.clone());
        }
        result
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        *lock(&self.signed_in) = None;
        Ok(())
    }

    fn current(&self) -> Option<Identity> {
        lock(&self.signed_in).clone()
    }
}
