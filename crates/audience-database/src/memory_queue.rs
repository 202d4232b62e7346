//! In-memory [`DurableQueue`] for tests and ephemeral hosts.
//!
//! Same semantics as the SQLite queue, without surviving a restart.

use crate::queue::{DrainGate, DurableQueue, QueuedRecord, RecordId};
use crate::DatabaseResult;
use audience_config_and_utils::PrivacyStatus;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Default)]
struct Inner {
    records: VecDeque<QueuedRecord>,
    next_id: i64,
}

/// Volatile hit queue.
#[derive(Default)]
pub struct MemoryHitQueue {
    inner: Mutex<Inner>,
    gate: DrainGate,
}

impl MemoryHitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads currently queued, oldest first.
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .records
            .iter()
            .map(|r| r.payload.clone())
            .collect()
    }

    fn purge_records(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.records.len();
        inner.records.clear();
        count
    }
}

impl DurableQueue for MemoryHitQueue {
    fn enqueue(&self, payload: &[u8]) -> DatabaseResult<QueuedRecord> {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let record = QueuedRecord {
            id: RecordId(inner.next_id),
            enqueued_at: Utc::now(),
            payload: payload.to_vec(),
        };
        inner.records.push_back(record.clone());
        Ok(record)
    }

    fn peek_oldest(&self) -> DatabaseResult<Option<QueuedRecord>> {
        Ok(self.inner.lock().records.front().cloned())
    }

    fn remove_oldest(&self) -> DatabaseResult<bool> {
        Ok(self.inner.lock().records.pop_front().is_some())
    }

    fn remove(&self, id: RecordId) -> DatabaseResult<bool> {
        let mut inner = self.inner.lock();
        let before = inner.records.len();
        inner.records.retain(|r| r.id != id);
        Ok(inner.records.len() < before)
    }

    fn len(&self) -> DatabaseResult<usize> {
        Ok(self.inner.lock().records.len())
    }

    fn purge(&self) -> DatabaseResult<usize> {
        Ok(self.purge_records())
    }

    fn on_privacy_change(&self, status: PrivacyStatus) -> DatabaseResult<usize> {
        self.gate.apply(status, || Ok(self.purge_records()))
    }

    fn is_draining(&self) -> bool {
        self.gate.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_and_remove_by_id() {
        let queue = MemoryHitQueue::new();
        let a = queue.enqueue(b"a").unwrap();
        let b = queue.enqueue(b"b").unwrap();
        assert!(b.id > a.id);

        assert!(queue.remove(b.id).unwrap());
        assert_eq!(queue.payloads(), vec![b"a".to_vec()]);
        assert!(!queue.remove(b.id).unwrap());
    }

    #[test]
    fn test_opt_out_purges() {
        let queue = MemoryHitQueue::new();
        queue.enqueue(b"a").unwrap();
        assert_eq!(queue.on_privacy_change(PrivacyStatus::OptedOut).unwrap(), 1);
        assert!(queue.is_empty().unwrap());
        assert!(!queue.is_draining());
    }
}
