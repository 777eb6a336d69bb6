//! Core logic for GroopList, a shared household grocery list.
//! Proximity alerts, optimistic list reconciliation and membership glue
//! live here; hosts supply identity, positioning and alert capabilities.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod proximity;
pub mod reconcile;
pub mod repo;
pub mod service;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, CoreConfig};
pub use error::{
    AuthError, CoreError, CoreResult, PositioningError, ReadError, Surface, WriteError,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::geo::{default_store_catalog, Location, PointOfInterest};
pub use model::household::{HouseholdCode, HouseholdRef, MemberLocation, UserHousehold};
pub use model::item::{Completion, GroceryItem, ItemId};
pub use model::notification::{
    unread_count, NotificationDraft, NotificationKind, NotificationRecord,
};
pub use proximity::distance::{distance, haversine, DistanceUnit};
pub use proximity::notifier::{
    NearbyPoi, ProximityConfig, ProximityEvent, ProximityNotifier, ProximityState,
};
pub use reconcile::list::{ItemState, ListEntry, ListReconciler};
pub use repo::session_repo::{
    DevicePrefs, RepoError, RepoResult, SessionRepository, SqliteSessionRepository,
};
pub use service::list_service::GroceryListService;
pub use service::location_service::{
    format_last_seen, LocationTracker, MemberLocationBoard, PositionOptions, PositioningSensor,
    TrackerStatus,
};
pub use service::membership_service::{MemberRoster, MembershipService, UserHouseholdsBoard};
pub use service::notification_service::{
    AlertPresenter, AlertsOutcome, HouseholdNotifications, NotificationFeed, NotificationSink,
    PermissionPrompt, PermissionState,
};
pub use service::session_service::{Identity, IdentityProvider, SessionContext, SessionManager};
pub use store::{DocumentStore, InMemoryDocumentStore, StoreError, Subscription};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
