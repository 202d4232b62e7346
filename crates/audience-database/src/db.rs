//! Database handle.

use crate::migrations::run_migrations;
use crate::profile::SqliteProfileStore;
use crate::sqlite_queue::SqliteHitQueue;
use crate::DatabaseResult;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One SQLite connection shared by the hit queue and the profile store.
///
/// Every statement is short and local, so callers run them inline rather
/// than on a dedicated executor.
#[derive(Clone)]
pub struct AudienceDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl AudienceDatabase {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Opening database");
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        Self::from_connection(conn)
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> DatabaseResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> DatabaseResult<Self> {
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// A queue over the `hits` table.
    pub fn hit_queue(&self) -> SqliteHitQueue {
        SqliteHitQueue::new(self.conn.clone())
    }

    /// A store over the `profile` table.
    pub fn profile_store(&self) -> SqliteProfileStore {
        SqliteProfileStore::new(self.conn.clone())
    }
}
