//! Local session persistence contracts and SQLite implementation.
//!
//! # Responsibility
//! - Store the last known identity and household selection as JSON values
//!   under stable keys.
//! - Store per-user device preferences (tracking and alert toggles).
//!
//! # Invariants
//! - Values are opaque JSON text; decoding failures surface as
//!   `RepoError::InvalidData` instead of being silently dropped.

use crate::db::DbError;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Key of the persisted signed-in user.
pub const SESSION_USER_KEY: &str = "session.user";
/// Key of the persisted household selection.
pub const SESSION_HOUSEHOLD_KEY: &str = "session.household";

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted session data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Device-local toggles restored after a restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DevicePrefs {
    pub location_enabled: bool,
    pub alerts_enabled: bool,
}

/// Key-value scratch store for session rehydration.
pub trait SessionRepository {
    fn put_value(&self, key: &str, value: &str) -> RepoResult<()>;
    fn get_value(&self, key: &str) -> RepoResult<Option<String>>;
    fn remove_value(&self, key: &str) -> RepoResult<()>;
    fn load_prefs(&self, user_id: &str) -> RepoResult<DevicePrefs>;
    fn save_prefs(&self, user_id: &str, prefs: &DevicePrefs) -> RepoResult<()>;

    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> RepoResult<()>
    where
        Self: Sized,
    {
        let text = serde_json::to_string(value)
            .map_err(|err| RepoError::InvalidData(format!("encode `{key}`: {err}")))?;
        self.put_value(key, &text)
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> RepoResult<Option<T>>
    where
        Self: Sized,
    {
        match self.get_value(key)? {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|err| RepoError::InvalidData(format!("decode `{key}`: {err}"))),
            None => Ok(None),
        }
    }
}

impl<R: SessionRepository> SessionRepository for &R {
    fn put_value(&self, key: &str, value: &str) -> RepoResult<()> {
        (*self).put_value(key, value)
    }

    fn get_value(&self, key: &str) -> RepoResult<Option<String>> {
        (*self).get_value(key)
    }

    fn remove_value(&self, key: &str) -> RepoResult<()> {
        (*self).remove_value(key)
    }

    fn load_prefs(&self, user_id: &str) -> RepoResult<DevicePrefs> {
        (*self).load_prefs(user_id)
    }

    fn save_prefs(&self, user_id: &str, prefs: &DevicePrefs) -> RepoResult<()> {
        (*self).save_prefs(user_id, prefs)
    }
}

/// SQLite-backed session repository.
pub struct SqliteSessionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSessionRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SessionRepository for SqliteSessionRepository<'_> {
    fn put_value(&self, key: &str, value: &str) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO kv_entries (key, value, updated_at)
             VALUES (?1, ?2, (strftime('%s', 'now') * 1000))
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at;",
            params![key, value],
        )?;
        Ok(())
    }

    fn get_value(&self, key: &str) -> RepoResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn remove_value(&self, key: &str) -> RepoResult<()> {
        self.conn
            .execute("DELETE FROM kv_entries WHERE key = ?1;", [key])?;
        Ok(())
    }

    fn load_prefs(&self, user_id: &str) -> RepoResult<DevicePrefs> {
        let row = self
            .conn
            .query_row(
                "SELECT location_enabled, alerts_enabled FROM device_prefs WHERE user_id = ?1;",
                [user_id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        match row {
            Some((location, alerts)) => Ok(DevicePrefs {
                location_enabled: int_to_bool(location, "location_enabled")?,
                alerts_enabled: int_to_bool(alerts, "alerts_enabled")?,
            }),
            None => Ok(DevicePrefs::default()),
        }
    }

    fn save_prefs(&self, user_id: &str, prefs: &DevicePrefs) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO device_prefs (user_id, location_enabled, alerts_enabled, updated_at)
             VALUES (?1, ?2, ?3, (strftime('%s', 'now') * 1000))
             ON CONFLICT(user_id) DO UPDATE SET
                location_enabled = excluded.location_enabled,
                alerts_enabled = excluded.alerts_enabled,
                updated_at = excluded.updated_at;",
            params![
                user_id,
                i64::from(prefs.location_enabled),
                i64::from(prefs.alerts_enabled)
            ],
        )?;
        Ok(())
    }
}

fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid {column} value `{other}` in device_prefs"
        ))),
    }
}
