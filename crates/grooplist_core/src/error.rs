//! Core error taxonomy.
//!
//! # Responsibility
//! - Classify failures of remote and device operations.
//! - Tell the UI how each failure is surfaced.
//!
//! # Invariants
//! - No error variant terminates a session; every failure is returned as
//!   a value and the caller decides how to present it.
//! - Notification permission refusal is not an error (see
//!   `service::notification_service::AlertsOutcome`).

use crate::config::ConfigError;
use crate::model::geo::GeoError;
use crate::model::household::{HouseholdCode, InvalidHouseholdCode};
use crate::model::item::ItemValidationError;
use crate::repo::session_repo::RepoError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CoreResult<T> = Result<T, CoreError>;

/// Identity provider failures; surfaced verbatim as a blocking gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The user closed the sign-in flow.
    Cancelled,
    /// An operation needs a signed-in identity.
    NotSignedIn,
    /// Provider-reported failure, message kept verbatim.
    Provider(String),
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "sign-in was cancelled"),
            Self::NotSignedIn => write!(f, "not signed in"),
            Self::Provider(message) => f.write_str(message),
        }
    }
}

impl Error for AuthError {}

/// Failure of a remote write (create, upsert, update, delete).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    Store {
        operation: &'static str,
        source: StoreError,
    },
    InvalidItem(ItemValidationError),
}

impl WriteError {
    pub fn store(operation: &'static str, source: StoreError) -> Self {
        Self::Store { operation, source }
    }
}

impl Display for WriteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store { operation, source } => write!(f, "failed to {operation}: {source}"),
            Self::InvalidItem(err) => write!(f, "{err}"),
        }
    }
}

impl Error for WriteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store { source, .. } => Some(source),
            Self::InvalidItem(err) => Some(err),
        }
    }
}

impl From<ItemValidationError> for WriteError {
    fn from(value: ItemValidationError) -> Self {
        Self::InvalidItem(value)
    }
}

/// Failure of a read or realtime subscription; shown inline in place of data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadError {
    message: String,
}

impl ReadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for ReadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to load: {}", self.message)
    }
}

impl Error for ReadError {}

impl From<StoreError> for ReadError {
    fn from(value: StoreError) -> Self {
        Self::new(value.to_string())
    }
}

/// Positioning sensor failures; location features degrade instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub enum PositioningError {
    Unsupported,
    PermissionDenied,
    Timeout,
    Unavailable(String),
    InvalidSample(GeoError),
}

impl Display for PositioningError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported => write!(f, "geolocation is not supported on this device"),
            Self::PermissionDenied => write!(f, "location permission denied"),
            Self::Timeout => write!(f, "location request timed out"),
            Self::Unavailable(message) => write!(f, "location unavailable: {message}"),
            Self::InvalidSample(err) => write!(f, "invalid location sample: {err}"),
        }
    }
}

impl Error for PositioningError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidSample(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GeoError> for PositioningError {
    fn from(value: GeoError) -> Self {
        Self::InvalidSample(value)
    }
}

/// How a failure is presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Blocks the UI until resolved (sign-in gate).
    Blocking,
    /// Dismissible banner.
    Banner,
    /// Inline message next to the affected data.
    Inline,
}

/// Umbrella error returned by core services.
#[derive(Debug)]
pub enum CoreError {
    Auth(AuthError),
    Write(WriteError),
    Read(ReadError),
    Positioning(PositioningError),
    Config(ConfigError),
    /// The session has no household selected.
    NoHousehold,
    HouseholdNotFound(HouseholdCode),
    InvalidHouseholdCode(InvalidHouseholdCode),
    EmptyHouseholdName,
    /// The user has no member record in the household.
    NotMember(HouseholdCode),
    ItemNotFound(String),
    /// Local persistence failure.
    Persistence(RepoError),
}

impl CoreError {
    pub fn surface(&self) -> Surface {
        match self {
            Self::Auth(_) => Surface::Blocking,
            Self::Read(_) | Self::Positioning(_) => Surface::Inline,
            _ => Surface::Banner,
        }
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(err) => write!(f, "{err}"),
            Self::Write(err) => write!(f, "{err}"),
            Self::Read(err) => write!(f, "{err}"),
            Self::Positioning(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::NoHousehold => write!(f, "no household selected"),
            Self::HouseholdNotFound(code) => {
                write!(f, "household {code} not found; please check the code")
            }
            Self::InvalidHouseholdCode(err) => write!(f, "{err}"),
            Self::EmptyHouseholdName => write!(f, "household name must not be empty"),
            Self::NotMember(code) => write!(f, "not a member of household {code}"),
            Self::ItemNotFound(id) => write!(f, "item not found: {id}"),
            Self::Persistence(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Auth(err) => Some(err),
            Self::Write(err) => Some(err),
            Self::Read(err) => Some(err),
            Self::Positioning(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::InvalidHouseholdCode(err) => Some(err),
            Self::Persistence(err) => Some(err),
            Self::NoHousehold
            | Self::HouseholdNotFound(_)
            | Self::EmptyHouseholdName
            | Self::NotMember(_)
            | Self::ItemNotFound(_) => None,
        }
    }
}

impl From<AuthError> for CoreError {
    fn from(value: AuthError) -> Self {
        Self::Auth(value)
    }
}

impl From<WriteError> for CoreError {
    fn from(value: WriteError) -> Self {
        Self::Write(value)
    }
}

impl From<ReadError> for CoreError {
    fn from(value: ReadError) -> Self {
        Self::Read(value)
    }
}

impl From<PositioningError> for CoreError {
    fn from(value: PositioningError) -> Self {
        Self::Positioning(value)
    }
}

impl From<ConfigError> for CoreError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<InvalidHouseholdCode> for CoreError {
    fn from(value: InvalidHouseholdCode) -> Self {
        Self::InvalidHouseholdCode(value)
    }
}

impl From<RepoError> for CoreError {
    fn from(value: RepoError) -> Self {
        Self::Persistence(value)
    }
}

impl From<ItemValidationError> for CoreError {
    fn from(value: ItemValidationError) -> Self {
        Self::Write(WriteError::InvalidItem(value))
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthError, CoreError, ReadError, Surface, WriteError};
    use crate::store::StoreError;

    #[test]
    fn surfaces_follow_error_taxonomy() {
        assert_eq!(
            CoreError::from(AuthError::Cancelled).surface(),
            Surface::Blocking
        );
        assert_eq!(
            CoreError::from(ReadError::new("stream closed")).surface(),
            Surface::Inline
        );
        let write = WriteError::store("add item", StoreError::Unavailable("offline".into()));
        assert_eq!(CoreError::from(write).surface(), Surface::Banner);
    }

    #[test]
    fn write_error_message_names_operation() {
        let err = WriteError::store("add item", StoreError::Unavailable("offline".into()));
        assert_eq!(
            err.to_string(),
            "failed to add item: document store unavailable: offline"
        );
    }

    #[test]
    fn provider_auth_error_is_verbatim() {
        let err = AuthError::Provider("popup blocked".to_string());
        assert_eq!(err.to_string(), "popup blocked");
    }
}
