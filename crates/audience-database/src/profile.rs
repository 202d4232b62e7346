//! Stored visitor profile (server uuid + segment map).

use crate::DatabaseResult;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::Arc;

const UUID_KEY: &str = "uuid";
const VISITOR_PROFILE_KEY: &str = "visitor_profile";

/// The persisted part of the profile. Privacy status is not stored: it is
/// re-declared by configuration on every start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredProfile {
    pub uuid: String,
    pub visitor_profile: BTreeMap<String, String>,
}

/// Where the profile survives restarts.
pub trait ProfileStore: Send + Sync {
    /// Load the stored profile; an empty store yields the default.
    fn load(&self) -> DatabaseResult<StoredProfile>;

    /// Replace the stored profile.
    fn save(&self, profile: &StoredProfile) -> DatabaseResult<()>;
}

/// Profile kept in the `profile` key/value table.
pub struct SqliteProfileStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteProfileStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

fn read_value(conn: &Connection, key: &str) -> DatabaseResult<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM profile WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

impl ProfileStore for SqliteProfileStore {
    fn load(&self) -> DatabaseResult<StoredProfile> {
        let conn = self.conn.lock();
        let uuid = read_value(&conn, UUID_KEY)?.unwrap_or_default();
        let visitor_profile = match read_value(&conn, VISITOR_PROFILE_KEY)? {
            Some(json) => serde_json::from_str(&json)?,
            None => BTreeMap::new(),
        };
        Ok(StoredProfile {
            uuid,
            visitor_profile,
        })
    }

    fn save(&self, profile: &StoredProfile) -> DatabaseResult<()> {
        let profile_json = serde_json::to_string(&profile.visitor_profile)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let entries = [
            (UUID_KEY, profile.uuid.as_str()),
            (VISITOR_PROFILE_KEY, profile_json.as_str()),
        ];
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO profile (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// Volatile profile store.
#[derive(Default)]
pub struct MemoryProfileStore {
    profile: Mutex<StoredProfile>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(profile: StoredProfile) -> Self {
        Self {
            profile: Mutex::new(profile),
        }
    }
}

impl ProfileStore for MemoryProfileStore {
    fn load(&self) -> DatabaseResult<StoredProfile> {
        Ok(self.profile.lock().clone())
    }

    fn save(&self, profile: &StoredProfile) -> DatabaseResult<()> {
        *self.profile.lock() = profile.clone();
        Ok(())
    }
}
