//! SQLite implementation of [`DurableQueue`].

use crate::queue::{DrainGate, DurableQueue, QueuedRecord, RecordId};
use crate::DatabaseResult;
use audience_config_and_utils::PrivacyStatus;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use tracing::debug;

/// Hit queue stored in the `hits` table.
///
/// Obtain one through [`crate::AudienceDatabase::hit_queue`]. The drain gate
/// is per instance, so an extension should hold exactly one.
pub struct SqliteHitQueue {
    conn: Arc<Mutex<Connection>>,
    gate: DrainGate,
}

impl SqliteHitQueue {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            gate: DrainGate::default(),
        }
    }

    fn purge_rows(&self) -> DatabaseResult<usize> {
        let conn = self.conn.lock();
        let count = conn.execute("DELETE FROM hits", [])?;
        Ok(count)
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

impl DurableQueue for SqliteHitQueue {
    fn enqueue(&self, payload: &[u8]) -> DatabaseResult<QueuedRecord> {
        let enqueued_at = Utc::now();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO hits (enqueued_at, payload) VALUES (?1, ?2)",
            params![enqueued_at.timestamp_millis(), payload],
        )?;
        let id = RecordId(conn.last_insert_rowid());

        debug!(hit_id = %id, bytes = payload.len(), "Enqueued hit");
        Ok(QueuedRecord {
            id,
            enqueued_at: millis_to_datetime(enqueued_at.timestamp_millis()),
            payload: payload.to_vec(),
        })
    }

    fn peek_oldest(&self) -> DatabaseResult<Option<QueuedRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT id, enqueued_at, payload FROM hits ORDER BY id ASC LIMIT 1",
                [],
                |row| {
                    Ok(QueuedRecord {
                        id: RecordId(row.get(0)?),
                        enqueued_at: millis_to_datetime(row.get(1)?),
                        payload: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn remove_oldest(&self) -> DatabaseResult<bool> {
        let conn = self.conn.lock();
        let count = conn.execute(
            "DELETE FROM hits WHERE id = (SELECT MIN(id) FROM hits)",
            [],
        )?;
        Ok(count > 0)
    }

    fn remove(&self, id: RecordId) -> DatabaseResult<bool> {
        let conn = self.conn.lock();
        let count = conn.execute("DELETE FROM hits WHERE id = ?1", params![id.0])?;
        Ok(count > 0)
    }

    fn len(&self) -> DatabaseResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM hits", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn purge(&self) -> DatabaseResult<usize> {
        self.purge_rows()
    }

    fn on_privacy_change(&self, status: PrivacyStatus) -> DatabaseResult<usize> {
        self.gate.apply(status, || self.purge_rows())
    }

    fn is_draining(&self) -> bool {
        self.gate.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AudienceDatabase;
    use tempfile::tempdir;

    fn queue() -> SqliteHitQueue {
        AudienceDatabase::open_in_memory().unwrap().hit_queue()
    }

    #[test]
    fn test_fifo_order() {
        let queue = queue();
        for i in 0..5u8 {
            queue.enqueue(&[i]).unwrap();
        }

        for i in 0..5u8 {
            let head = queue.peek_oldest().unwrap().unwrap();
            assert_eq!(head.payload, vec![i]);
            assert!(queue.remove_oldest().unwrap());
        }
        assert!(queue.peek_oldest().unwrap().is_none());
        assert!(!queue.remove_oldest().unwrap());
    }

    #[test]
    fn test_peek_does_not_remove() {
        let queue = queue();
        queue.enqueue(b"a").unwrap();

        let first = queue.peek_oldest().unwrap().unwrap();
        let second = queue.peek_oldest().unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn test_remove_by_id_after_purge_is_noop() {
        let queue = queue();
        let head = queue.enqueue(b"a").unwrap();
        queue.purge().unwrap();
        let next = queue.enqueue(b"b").unwrap();

        assert!(!queue.remove(head.id).unwrap());
        assert_eq!(queue.peek_oldest().unwrap().unwrap().id, next.id);
    }

    #[test]
    fn test_ids_keep_increasing_after_delete() {
        let queue = queue();
        let a = queue.enqueue(b"a").unwrap();
        queue.remove(a.id).unwrap();
        let b = queue.enqueue(b"b").unwrap();
        assert!(b.id > a.id);
    }

    #[test]
    fn test_starts_halted_until_opt_in() {
        let queue = queue();
        assert!(!queue.is_draining());

        queue.on_privacy_change(PrivacyStatus::OptedIn).unwrap();
        assert!(queue.is_draining());

        queue.on_privacy_change(PrivacyStatus::Unknown).unwrap();
        assert!(!queue.is_draining());
    }

    #[test]
    fn test_opt_out_purges_and_halts() {
        let queue = queue();
        queue.on_privacy_change(PrivacyStatus::OptedIn).unwrap();
        queue.enqueue(b"a").unwrap();
        queue.enqueue(b"b").unwrap();

        let purged = queue.on_privacy_change(PrivacyStatus::OptedOut).unwrap();
        assert_eq!(purged, 2);
        assert!(queue.is_empty().unwrap());
        assert!(!queue.is_draining());

        // Opting back in does not resurrect anything.
        queue.on_privacy_change(PrivacyStatus::OptedIn).unwrap();
        assert!(queue.is_empty().unwrap());
        assert!(queue.is_draining());
    }

    #[test]
    fn test_unknown_halts_without_purge() {
        let queue = queue();
        queue.enqueue(b"a").unwrap();
        let purged = queue.on_privacy_change(PrivacyStatus::Unknown).unwrap();
        assert_eq!(purged, 0);
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audience.sqlite");

        {
            let db = AudienceDatabase::open(&path).unwrap();
            let queue = db.hit_queue();
            queue.enqueue(b"first").unwrap();
            queue.enqueue(b"second").unwrap();
        }

        let db = AudienceDatabase::open(&path).unwrap();
        let queue = db.hit_queue();
        assert_eq!(queue.len().unwrap(), 2);
        assert_eq!(queue.peek_oldest().unwrap().unwrap().payload, b"first");
    }
}
