use grooplist_core::db::{open_db, open_db_in_memory};
use grooplist_core::testing::FakeIdentityProvider;
use grooplist_core::{
    AuthError, CoreError, DevicePrefs, HouseholdCode, HouseholdRef, RepoError, SessionManager,
    SessionRepository, SqliteSessionRepository, Surface,
};

fn home() -> HouseholdRef {
    HouseholdRef {
        code: HouseholdCode::parse("AB12CD").unwrap(),
        name: "Home".to_string(),
    }
}

#[test]
fn repository_round_trips_values_and_prefs() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteSessionRepository::new(&conn);

    assert_eq!(repo.get_value("missing").unwrap(), None);
    repo.put_value("k", "one").unwrap();
    repo.put_value("k", "two").unwrap();
    assert_eq!(repo.get_value("k").unwrap().as_deref(), Some("two"));
    repo.remove_value("k").unwrap();
    repo.remove_value("k").unwrap();
    assert_eq!(repo.get_value("k").unwrap(), None);

    assert_eq!(repo.load_prefs("u1").unwrap(), DevicePrefs::default());
    let prefs = DevicePrefs {
        location_enabled: true,
        alerts_enabled: false,
    };
    repo.save_prefs("u1", &prefs).unwrap();
    assert_eq!(repo.load_prefs("u1").unwrap(), prefs);
}

#[test]
fn corrupt_json_surfaces_invalid_data() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteSessionRepository::new(&conn);
    repo.put_value("session.household", "{not json").unwrap();
    let err = repo.get_json::<HouseholdRef>("session.household").unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}

#[test]
fn sign_in_uses_provider_display_name() {
    let conn = open_db_in_memory().unwrap();
    let mut manager = SessionManager::new(
        FakeIdentityProvider::signing_in("u1", Some("Ana Lopez")),
        SqliteSessionRepository::new(&conn),
    );
    let context = manager.sign_in().unwrap();
    assert_eq!(context.user_id(), "u1");
    assert_eq!(context.member_name(), "Ana Lopez");
    assert!(context.household().is_none());
}

#[test]
fn cancelled_sign_in_is_a_blocking_auth_error() {
    let conn = open_db_in_memory().unwrap();
    let mut manager = SessionManager::new(
        FakeIdentityProvider::failing(AuthError::Cancelled),
        SqliteSessionRepository::new(&conn),
    );
    let err = manager.sign_in().unwrap_err();
    assert!(matches!(err, CoreError::Auth(AuthError::Cancelled)));
    assert_eq!(err.surface(), Surface::Blocking);
    assert!(manager.current().is_none());
}

#[test]
fn household_selection_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grooplist.db");

    {
        let conn = open_db(&path).unwrap();
        let mut manager = SessionManager::new(
            FakeIdentityProvider::signing_in("u1", None),
            SqliteSessionRepository::new(&conn),
        );
        manager.sign_in().unwrap();
        manager.set_member_name("  Ana ").unwrap();
        manager.select_household(home()).unwrap();
    }

    let conn = open_db(&path).unwrap();
    let mut manager = SessionManager::new(
        FakeIdentityProvider::already_signed_in("u1", Some("Provider Name")),
        SqliteSessionRepository::new(&conn),
    );
    let context = manager.restore().unwrap();
    assert_eq!(context.member_name(), "Ana");
    assert_eq!(context.household(), Some(&home()));
}

#[test]
fn selection_of_another_user_is_not_restored() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteSessionRepository::new(&conn);
    {
        let mut manager =
            SessionManager::new(FakeIdentityProvider::signing_in("u1", Some("Ana")), &repo);
        manager.sign_in().unwrap();
        manager.select_household(home()).unwrap();
    }

    let mut manager =
        SessionManager::new(FakeIdentityProvider::already_signed_in("u2", Some("Ben")), &repo);
    let context = manager.restore().unwrap();
    assert_eq!(context.member_name(), "Ben");
    assert!(context.household().is_none());
    assert_eq!(repo.get_value("session.household").unwrap(), None);
}

#[test]
fn restore_without_identity_yields_nothing() {
    let conn = open_db_in_memory().unwrap();
    let mut manager = SessionManager::new(
        FakeIdentityProvider::signing_in("u1", None),
        SqliteSessionRepository::new(&conn),
    );
    assert!(manager.restore().is_none());
}

#[test]
fn clear_household_and_sign_out_drop_persisted_state() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteSessionRepository::new(&conn);
    let mut manager = SessionManager::new(FakeIdentityProvider::signing_in("u1", None), &repo);
    manager.sign_in().unwrap();
    manager.select_household(home()).unwrap();

    manager.clear_household().unwrap();
    assert!(manager.current().unwrap().household().is_none());
    assert_eq!(repo.get_value("session.household").unwrap(), None);

    manager.select_household(home()).unwrap();
    manager.sign_out().unwrap();
    assert!(manager.current().is_none());
    assert_eq!(repo.get_value("session.user").unwrap(), None);
    assert_eq!(repo.get_value("session.household").unwrap(), None);
    assert!(manager.restore().is_none());
}

#[test]
fn household_operations_require_sign_in() {
    let conn = open_db_in_memory().unwrap();
    let mut manager = SessionManager::new(
        FakeIdentityProvider::signing_in("u1", None),
        SqliteSessionRepository::new(&conn),
    );
    let err = manager.select_household(home()).unwrap_err();
    assert!(matches!(err, CoreError::Auth(AuthError::NotSignedIn)));
}

#[test]
fn device_prefs_follow_the_signed_in_user() {
    let conn = open_db_in_memory().unwrap();
    let mut manager = SessionManager::new(
        FakeIdentityProvider::signing_in("u1", None),
        SqliteSessionRepository::new(&conn),
    );
    assert!(manager.device_prefs().is_err());

    manager.sign_in().unwrap();
    let prefs = DevicePrefs {
        location_enabled: true,
        alerts_enabled: true,
    };
    manager.save_device_prefs(prefs).unwrap();
    assert_eq!(manager.device_prefs().unwrap(), prefs);
}
