//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose stable, use-case-level functions to Dart via FRB.
//! - Keep the proximity notifier and session persistence on the Rust side;
//!   the host only forwards sensor fixes and identity results.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Return values are UTF-8 strings or plain envelopes with stable meaning.
//! - Identity is authenticated by the host; Rust only binds it to local state.

use grooplist_core::db::open_db;
use grooplist_core::{
    core_version as core_version_inner, format_last_seen as format_last_seen_inner,
    init_logging as init_logging_inner, ping as ping_inner, AuthError, CoreConfig, DevicePrefs,
    HouseholdCode, HouseholdRef, Identity, IdentityProvider, Location, NearbyPoi,
    ProximityNotifier, SessionContext, SessionManager, SqliteSessionRepository,
};
use log::warn;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

const SESSION_DB_FILE_NAME: &str = "grooplist_session.sqlite3";
static SESSION_DB_PATH: OnceLock<PathBuf> = OnceLock::new();
static PROXIMITY: OnceLock<Mutex<ProximityRuntime>> = OnceLock::new();

struct ProximityRuntime {
    config: CoreConfig,
    notifier: ProximityNotifier,
}

impl ProximityRuntime {
    fn from_config(config: CoreConfig) -> Result<Self, String> {
        let proximity = config.proximity().map_err(|err| err.to_string())?;
        Ok(Self {
            config,
            notifier: ProximityNotifier::new(proximity),
        })
    }
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Reconfiguration attempts with different level or directory return error.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Replaces the active core configuration with a JSON override document.
///
/// Missing fields take defaults. Proximity state is reset on success and
/// left untouched on failure. Returns empty string on success.
#[flutter_rust_bridge::frb(sync)]
pub fn configure_core(config_json: String) -> String {
    let runtime =
        CoreConfig::from_json(&config_json).map_err(|err| format!("invalid config: {err}"));
    match runtime.and_then(ProximityRuntime::from_config) {
        Ok(runtime) => {
            *lock_proximity() = runtime;
            String::new()
        }
        Err(message) => {
            warn!("event=configure_core module=ffi status=error");
            message
        }
    }
}

/// One catalog store with its distance from the queried position.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreDistanceItem {
    pub store_id: String,
    pub name: String,
    pub address: String,
    pub distance: f64,
    /// Distance unit label (`mi|km`).
    pub unit: String,
}

/// Response envelope for nearby-store queries.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyStoresResponse {
    pub ok: bool,
    /// Stores within the proximity threshold, nearest first.
    pub items: Vec<StoreDistanceItem>,
    pub message: String,
}

/// Response envelope for one proximity sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityResponse {
    pub ok: bool,
    /// Stores that came into range with this sample.
    pub entered: Vec<StoreDistanceItem>,
    /// Whether the sample reached the notifier at all.
    pub evaluated: bool,
    pub message: String,
}

/// Lists catalog stores in range of a position without touching proximity state.
#[flutter_rust_bridge::frb(sync)]
pub fn nearby_stores(latitude: f64, longitude: f64) -> NearbyStoresResponse {
    let location = match Location::new(latitude, longitude, 0) {
        Ok(location) => location,
        Err(err) => {
            return NearbyStoresResponse {
                ok: false,
                items: Vec::new(),
                message: format!("nearby_stores failed: {err}"),
            };
        }
    };
    let runtime = lock_proximity();
    let items = runtime
        .notifier
        .nearby(&location, &runtime.config.stores)
        .into_iter()
        .map(|nearby| to_store_item(nearby, &runtime.config))
        .collect::<Vec<_>>();
    NearbyStoresResponse {
        ok: true,
        message: format!("{} store(s) nearby", items.len()),
        items,
    }
}

/// Feeds one location sample to the process-wide proximity notifier.
///
/// Samples are skipped while the list has no unfinished items; skipped
/// samples leave proximity state untouched.
#[flutter_rust_bridge::frb(sync)]
pub fn proximity_observe(
    latitude: f64,
    longitude: f64,
    captured_at_ms: i64,
    unfinished_items: u32,
) -> ProximityResponse {
    let location = match Location::new(latitude, longitude, captured_at_ms) {
        Ok(location) => location,
        Err(err) => {
            return ProximityResponse {
                ok: false,
                entered: Vec::new(),
                evaluated: false,
                message: format!("proximity_observe failed: {err}"),
            };
        }
    };
    if unfinished_items == 0 {
        return ProximityResponse {
            ok: true,
            entered: Vec::new(),
            evaluated: false,
            message: "no unfinished items".to_string(),
        };
    }

    let mut runtime = lock_proximity();
    let ProximityRuntime { config, notifier } = &mut *runtime;
    let entered = notifier
        .observe(&location, &config.stores)
        .into_iter()
        .map(|event| {
            to_store_item(
                NearbyPoi {
                    poi: event.poi,
                    distance: event.distance,
                },
                config,
            )
        })
        .collect::<Vec<_>>();
    ProximityResponse {
        ok: true,
        message: format!("{} store(s) entered", entered.len()),
        entered,
        evaluated: true,
    }
}

/// Forgets every store currently considered near.
#[flutter_rust_bridge::frb(sync)]
pub fn proximity_reset() {
    lock_proximity().notifier.reset();
}

/// "Last seen" label for a member location timestamp.
#[flutter_rust_bridge::frb(sync)]
pub fn format_last_seen(timestamp_ms: Option<i64>, now_ms: i64) -> String {
    format_last_seen_inner(timestamp_ms, now_ms)
}

/// Normalizes a user-typed household code.
///
/// Returns the canonical code, or empty string when the input is not a code.
#[flutter_rust_bridge::frb(sync)]
pub fn normalize_household_code(raw: String) -> String {
    HouseholdCode::parse(&raw)
        .map(String::from)
        .unwrap_or_default()
}

/// Session snapshot returned to the host after every session call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResponse {
    pub ok: bool,
    pub user_id: Option<String>,
    pub member_name: Option<String>,
    pub household_code: Option<String>,
    pub household_name: Option<String>,
    pub message: String,
}

impl SessionResponse {
    fn from_context(context: &SessionContext, message: impl Into<String>) -> Self {
        Self {
            ok: true,
            user_id: Some(context.user_id().to_string()),
            member_name: Some(context.member_name().to_string()),
            household_code: context
                .household()
                .map(|household| household.code.to_string()),
            household_name: context.household().map(|household| household.name.clone()),
            message: message.into(),
        }
    }

    fn signed_out(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            user_id: None,
            member_name: None,
            household_code: None,
            household_name: None,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            ..Self::signed_out(message)
        }
    }
}

/// Device-local toggles for the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePrefsResponse {
    pub ok: bool,
    pub location_enabled: bool,
    pub alerts_enabled: bool,
    pub message: String,
}

/// Binds a host-authenticated identity and restores its household selection.
#[flutter_rust_bridge::frb(sync)]
pub fn session_sign_in(user_id: String, display_name: Option<String>) -> SessionResponse {
    with_session(user_id, display_name, |_| Ok("signed in".to_string()))
}

/// Sets the display name used for attribution.
#[flutter_rust_bridge::frb(sync)]
pub fn session_set_member_name(
    user_id: String,
    display_name: Option<String>,
    member_name: String,
) -> SessionResponse {
    with_session(user_id, display_name, |manager| {
        manager
            .set_member_name(&member_name)
            .map(|_| "member name saved".to_string())
            .map_err(|err| err.to_string())
    })
}

/// Remembers the selected household for this user.
#[flutter_rust_bridge::frb(sync)]
pub fn session_select_household(
    user_id: String,
    display_name: Option<String>,
    household_code: String,
    household_name: String,
) -> SessionResponse {
    with_session(user_id, display_name, |manager| {
        let code = HouseholdCode::parse(&household_code).map_err(|err| err.to_string())?;
        manager
            .select_household(HouseholdRef {
                code,
                name: household_name,
            })
            .map(|_| "household selected".to_string())
            .map_err(|err| err.to_string())
    })
}

/// Forgets the household selection, e.g. after leaving it.
#[flutter_rust_bridge::frb(sync)]
pub fn session_clear_household(user_id: String, display_name: Option<String>) -> SessionResponse {
    with_session(user_id, display_name, |manager| {
        manager
            .clear_household()
            .map(|_| "household cleared".to_string())
            .map_err(|err| err.to_string())
    })
}

/// Destroys persisted session state and resets proximity state.
#[flutter_rust_bridge::frb(sync)]
pub fn session_sign_out(user_id: String) -> SessionResponse {
    let result = with_session_manager(user_id, None, |manager| {
        manager.sign_out().map_err(|err| err.to_string())
    });
    match result {
        Ok(()) => {
            proximity_reset();
            SessionResponse::signed_out("signed out")
        }
        Err(message) => SessionResponse::failure(format!("session_sign_out failed: {message}")),
    }
}

/// Loads device toggles; defaults when none were saved.
#[flutter_rust_bridge::frb(sync)]
pub fn device_prefs_load(user_id: String) -> DevicePrefsResponse {
    let result = with_session_manager(user_id, None, |manager| {
        manager.device_prefs().map_err(|err| err.to_string())
    });
    match result {
        Ok(prefs) => DevicePrefsResponse {
            ok: true,
            location_enabled: prefs.location_enabled,
            alerts_enabled: prefs.alerts_enabled,
            message: "loaded".to_string(),
        },
        Err(message) => DevicePrefsResponse {
            ok: false,
            location_enabled: false,
            alerts_enabled: false,
            message: format!("device_prefs_load failed: {message}"),
        },
    }
}

/// Saves device toggles. Returns empty string on success.
#[flutter_rust_bridge::frb(sync)]
pub fn device_prefs_save(user_id: String, location_enabled: bool, alerts_enabled: bool) -> String {
    let prefs = DevicePrefs {
        location_enabled,
        alerts_enabled,
    };
    match with_session_manager(user_id, None, |manager| {
        manager
            .save_device_prefs(prefs)
            .map_err(|err| err.to_string())
    }) {
        Ok(()) => String::new(),
        Err(message) => format!("device_prefs_save failed: {message}"),
    }
}

/// Identity already authenticated by the host platform.
struct HostIdentity {
    identity: Identity,
}

impl IdentityProvider for HostIdentity {
    fn sign_in(&self) -> Result<Identity, AuthError> {
        Ok(self.identity.clone())
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }

    fn current(&self) -> Option<Identity> {
        Some(self.identity.clone())
    }
}

type FfiSessionManager<'conn> = SessionManager<HostIdentity, SqliteSessionRepository<'conn>>;

fn with_session(
    user_id: String,
    display_name: Option<String>,
    f: impl FnOnce(&mut FfiSessionManager<'_>) -> Result<String, String>,
) -> SessionResponse {
    let result = with_session_manager(user_id, display_name, |manager| {
        let message = f(manager)?;
        manager
            .current()
            .map(|context| SessionResponse::from_context(context, message))
            .ok_or_else(|| "no active session".to_string())
    });
    result.unwrap_or_else(|message| SessionResponse::failure(format!("session failed: {message}")))
}

fn with_session_manager<T>(
    user_id: String,
    display_name: Option<String>,
    f: impl FnOnce(&mut FfiSessionManager<'_>) -> Result<T, String>,
) -> Result<T, String> {
    let user_id = user_id.trim().to_string();
    if user_id.is_empty() {
        return Err(AuthError::NotSignedIn.to_string());
    }
    let db_path = resolve_session_db_path();
    let conn = open_db(&db_path).map_err(|err| format!("session DB open failed: {err}"))?;
    let provider = HostIdentity {
        identity: Identity {
            user_id,
            display_name,
        },
    };
    let mut manager = SessionManager::new(provider, SqliteSessionRepository::new(&conn));
    manager
        .restore()
        .ok_or_else(|| AuthError::NotSignedIn.to_string())?;
    f(&mut manager)
}

fn resolve_session_db_path() -> PathBuf {
    SESSION_DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var("GROOPLIST_DB_PATH") {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(SESSION_DB_FILE_NAME)
        })
        .clone()
}

fn lock_proximity() -> MutexGuard<'static, ProximityRuntime> {
    PROXIMITY
        .get_or_init(|| {
            let config = CoreConfig::default();
            let notifier = ProximityNotifier::new(config.proximity().unwrap_or_default());
            Mutex::new(ProximityRuntime { config, notifier })
        })
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

fn to_store_item(nearby: NearbyPoi, config: &CoreConfig) -> StoreDistanceItem {
    StoreDistanceItem {
        store_id: nearby.poi.id,
        name: nearby.poi.name,
        address: nearby.poi.address,
        distance: nearby.distance,
        unit: config.distance_unit.label().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        configure_core, core_version, device_prefs_load, device_prefs_save, format_last_seen,
        init_logging, nearby_stores, normalize_household_code, ping, proximity_observe,
        session_select_household, session_set_member_name, session_sign_in, session_sign_out,
    };
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};

    // Proximity state is process-wide.
    static PROXIMITY_TESTS: Mutex<()> = Mutex::new(());

    const WHOLE_FOODS: (f64, f64) = (37.7749, -122.4194);

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let error = init_logging("info".to_string(), String::new());
        assert!(!error.is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn configure_core_rejects_invalid_threshold() {
        let _guard = PROXIMITY_TESTS.lock().unwrap_or_else(|err| err.into_inner());
        let error = configure_core(r#"{"proximity_threshold": 0}"#.to_string());
        assert!(error.starts_with("invalid config"));
    }

    #[test]
    fn nearby_stores_lists_store_at_position() {
        let _guard = PROXIMITY_TESTS.lock().unwrap_or_else(|err| err.into_inner());
        let response = nearby_stores(WHOLE_FOODS.0, WHOLE_FOODS.1);
        assert!(response.ok, "{}", response.message);
        assert_eq!(response.items[0].store_id, "1");
        assert_eq!(response.items[0].unit, "mi");
        assert!(!nearby_stores(91.0, 0.0).ok);
    }

    #[test]
    fn proximity_observe_fires_once_per_entry_and_skips_empty_lists() {
        let _guard = PROXIMITY_TESTS.lock().unwrap_or_else(|err| err.into_inner());
        assert_eq!(configure_core("{}".to_string()), "");

        let skipped = proximity_observe(WHOLE_FOODS.0, WHOLE_FOODS.1, 0, 0);
        assert!(skipped.ok);
        assert!(!skipped.evaluated);

        let first = proximity_observe(WHOLE_FOODS.0, WHOLE_FOODS.1, 0, 2);
        assert!(first.evaluated);
        assert!(first.entered.iter().any(|item| item.store_id == "1"));

        let second = proximity_observe(WHOLE_FOODS.0, WHOLE_FOODS.1, 1, 2);
        assert!(second.entered.is_empty());
    }

    #[test]
    fn format_last_seen_handles_missing_timestamp() {
        assert_eq!(format_last_seen(None, 0), "unknown");
        assert_eq!(format_last_seen(Some(0), 120_000), "2 mins ago");
    }

    #[test]
    fn normalize_household_code_returns_empty_for_garbage() {
        assert_eq!(normalize_household_code("  ".to_string()), "");
    }

    #[test]
    fn session_round_trip_restores_household_and_prefs() {
        let user = unique_token("user");
        let signed_in = session_sign_in(user.clone(), Some("Ana".to_string()));
        assert!(signed_in.ok, "{}", signed_in.message);
        assert_eq!(signed_in.member_name.as_deref(), Some("Ana"));
        assert_eq!(signed_in.household_code, None);

        let renamed = session_set_member_name(user.clone(), None, " Ana B ".to_string());
        assert_eq!(renamed.member_name.as_deref(), Some("Ana B"));

        let selected = session_select_household(
            user.clone(),
            None,
            "abc123".to_string(),
            "Home".to_string(),
        );
        assert!(selected.ok, "{}", selected.message);
        assert_eq!(selected.household_code.as_deref(), Some("ABC123"));

        let restored = session_sign_in(user.clone(), None);
        assert_eq!(restored.household_name.as_deref(), Some("Home"));
        assert_eq!(restored.member_name.as_deref(), Some("Ana B"));

        assert_eq!(device_prefs_save(user.clone(), true, false), "");
        let prefs = device_prefs_load(user.clone());
        assert!(prefs.ok, "{}", prefs.message);
        assert!(prefs.location_enabled);
        assert!(!prefs.alerts_enabled);

        let signed_out = session_sign_out(user.clone());
        assert!(signed_out.ok, "{}", signed_out.message);
        assert_eq!(session_sign_in(user, None).household_code, None);
    }

    #[test]
    fn session_calls_require_user_id() {
        let response = session_sign_in("  ".to_string(), None);
        assert!(!response.ok);
    }

    fn unique_token(prefix: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards")
            .as_nanos();
        format!("{prefix}-{nanos}")
    }
}
