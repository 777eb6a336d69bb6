//! Session lifecycle.
//!
//! # Responsibility
//! - Bind an authenticated identity, a member display name and an
//!   optional household selection into one explicit `SessionContext`.
//! - Rehydrate that context from local persistence after a restart.
//!
//! # Invariants
//! - A context exists only between `sign_in`/`restore` and `sign_out`.
//! - A persisted household selection is restored only for the same user.
//! - Local persistence failures never block sign-in; they are logged.

use crate::error::{AuthError, CoreError, CoreResult};
use crate::model::household::HouseholdRef;
use crate::repo::session_repo::{
    DevicePrefs, SessionRepository, SESSION_HOUSEHOLD_KEY, SESSION_USER_KEY,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Opaque identity supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub display_name: Option<String>,
}

/// Federated sign-in provider.
pub trait IdentityProvider {
    fn sign_in(&self) -> Result<Identity, AuthError>;
    fn sign_out(&self) -> Result<(), AuthError>;
    /// Identity of an already authenticated user, if any.
    fn current(&self) -> Option<Identity>;
}

/// Persisted shape of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PersistedUser {
    id: String,
    name: String,
}

/// Explicit per-session state passed to every household operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    identity: Identity,
    member_name: String,
    household: Option<HouseholdRef>,
}

impl SessionContext {
    pub fn new(identity: Identity, member_name: impl Into<String>) -> Self {
        Self {
            identity,
            member_name: member_name.into(),
            household: None,
        }
    }

    pub fn with_household(mut self, household: HouseholdRef) -> Self {
        self.household = Some(household);
        self
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Name shown to other household members.
    pub fn member_name(&self) -> &str {
        &self.member_name
    }

    pub fn household(&self) -> Option<&HouseholdRef> {
        self.household.as_ref()
    }

    pub fn require_household(&self) -> CoreResult<&HouseholdRef> {
        self.household.as_ref().ok_or(CoreError::NoHousehold)
    }
}

/// Owns the session context and its persistence.
pub struct SessionManager<P: IdentityProvider, R: SessionRepository> {
    provider: P,
    repo: R,
    current: Option<SessionContext>,
}

impl<P: IdentityProvider, R: SessionRepository> SessionManager<P, R> {
    pub fn new(provider: P, repo: R) -> Self {
        Self {
            provider,
            repo,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&SessionContext> {
        self.current.as_ref()
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Runs the sign-in flow and creates a fresh context.
    pub fn sign_in(&mut self) -> CoreResult<&SessionContext> {
        let identity = self.provider.sign_in().map_err(|err| {
            warn!("event=sign_in module=session status=error error={err}");
            CoreError::Auth(err)
        })?;
        info!("event=sign_in module=session status=ok");
        Ok(self.bind(identity))
    }

    /// Rebuilds the context for an already authenticated user.
    ///
    /// Returns `None` when the provider has no active identity.
    pub fn restore(&mut self) -> Option<&SessionContext> {
        let identity = self.provider.current()?;
        info!("event=session_restore module=session status=ok");
        Some(self.bind(identity))
    }

    /// Sets the display name used for attribution in the household.
    pub fn set_member_name(&mut self, name: &str) -> CoreResult<&SessionContext> {
        let name = name.trim().to_string();
        let context = self
            .current
            .as_mut()
            .ok_or(CoreError::Auth(AuthError::NotSignedIn))?;
        context.member_name = name;
        let persisted = PersistedUser {
            id: context.identity.user_id.clone(),
            name: context.member_name.clone(),
        };
        if let Err(err) = self.repo.put_json(SESSION_USER_KEY, &persisted) {
            warn!("event=session_persist module=session status=error key=user error={err}");
        }
        Ok(context)
    }

    /// Binds a household to the session and remembers the selection.
    pub fn select_household(&mut self, household: HouseholdRef) -> CoreResult<&SessionContext> {
        let context = self
            .current
            .as_mut()
            .ok_or(CoreError::Auth(AuthError::NotSignedIn))?;
        if let Err(err) = self.repo.put_json(SESSION_HOUSEHOLD_KEY, &household) {
            warn!("event=session_persist module=session status=error key=household error={err}");
        }
        info!("event=household_select module=session status=ok");
        context.household = Some(household);
        Ok(context)
    }

    /// Drops the household selection, e.g. after leaving.
    pub fn clear_household(&mut self) -> CoreResult<()> {
        if let Some(context) = self.current.as_mut() {
            context.household = None;
        }
        self.repo.remove_value(SESSION_HOUSEHOLD_KEY)?;
        Ok(())
    }

    /// Device toggles of the signed-in user; defaults when none are stored.
    pub fn device_prefs(&self) -> CoreResult<DevicePrefs> {
        let context = self
            .current
            .as_ref()
            .ok_or(CoreError::Auth(AuthError::NotSignedIn))?;
        Ok(self.repo.load_prefs(context.user_id())?)
    }

    pub fn save_device_prefs(&self, prefs: DevicePrefs) -> CoreResult<()> {
        let context = self
            .current
            .as_ref()
            .ok_or(CoreError::Auth(AuthError::NotSignedIn))?;
        self.repo.save_prefs(context.user_id(), &prefs)?;
        Ok(())
    }

    /// Signs out and destroys the context and its persisted state.
    pub fn sign_out(&mut self) -> CoreResult<()> {
        self.provider.sign_out()?;
        self.current = None;
        self.repo.remove_value(SESSION_USER_KEY)?;
        self.repo.remove_value(SESSION_HOUSEHOLD_KEY)?;
        info!("event=sign_out module=session status=ok");
        Ok(())
    }

    fn bind(&mut self, identity: Identity) -> &SessionContext {
        let persisted_user = self
            .repo
            .get_json::<PersistedUser>(SESSION_USER_KEY)
            .unwrap_or_else(|err| {
                warn!("event=session_restore module=session status=error key=user error={err}");
                None
            })
            .filter(|user| user.id == identity.user_id);

        let household = match persisted_user {
            Some(_) => self
                .repo
                .get_json::<HouseholdRef>(SESSION_HOUSEHOLD_KEY)
                .unwrap_or_else(|err| {
                    warn!(
                        "event=session_restore module=session status=error key=household error={err}"
                    );
                    None
                }),
            None => None,
        };

        let member_name = persisted_user
            .map(|user| user.name)
            .filter(|name| !name.is_empty())
            .or_else(|| identity.display_name.clone())
            .unwrap_or_default();

        let persisted = PersistedUser {
            id: identity.user_id.clone(),
            name: member_name.clone(),
        };
        if let Err(err) = self.repo.put_json(SESSION_USER_KEY, &persisted) {
            warn!("event=session_persist module=session status=error key=user error={err}");
        }
        if household.is_none() {
            if let Err(err) = self.repo.remove_value(SESSION_HOUSEHOLD_KEY) {
                warn!("event=session_persist module=session status=error key=household error={err}");
            }
        }

        let mut context = SessionContext::new(identity, member_name);
        context.household = household;
        self.current.insert(context)
    }
}
