//! Durable FIFO queue contract.
//!
//! The queue stores opaque payloads. It knows nothing about what a hit is;
//! encoding lives with the caller.
//!
//! # Guarantees
//!
//! - FIFO by enqueue order (ids are strictly increasing)
//! - `enqueue` returns only after the record is persisted
//! - `on_privacy_change(OptedOut)` purges every pending record and halts
//!   draining; draining resumes only on `OptedIn`
//! - removal is logical by id, so a record purged while in flight can't
//!   cause a later record to be removed in its place

use crate::DatabaseResult;
use audience_config_and_utils::PrivacyStatus;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Position of a record in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedRecord {
    pub id: RecordId,
    pub enqueued_at: DateTime<Utc>,
    pub payload: Vec<u8>,
}

/// Ordered, persisted FIFO of opaque records.
pub trait DurableQueue: Send + Sync {
    /// Persist a record at the tail.
    fn enqueue(&self, payload: &[u8]) -> DatabaseResult<QueuedRecord>;

    /// The oldest pending record, if any.
    fn peek_oldest(&self) -> DatabaseResult<Option<QueuedRecord>>;

    /// Remove the oldest pending record. Returns false when empty.
    fn remove_oldest(&self) -> DatabaseResult<bool>;

    /// Remove a specific record. Returns false if it was already gone.
    fn remove(&self, id: RecordId) -> DatabaseResult<bool>;

    /// Number of pending records.
    fn len(&self) -> DatabaseResult<usize>;

    fn is_empty(&self) -> DatabaseResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every pending record, returning how many were dropped.
    fn purge(&self) -> DatabaseResult<usize>;

    /// Apply a privacy transition: purge and halt on opt-out, halt on
    /// unknown, resume on opt-in. Returns the number of purged records.
    fn on_privacy_change(&self, status: PrivacyStatus) -> DatabaseResult<usize>;

    /// Whether records may currently be drained.
    fn is_draining(&self) -> bool;
}

/// Drain on/off switch shared by the queue implementations.
///
/// Starts halted: nothing drains until an opt-in is observed.
#[derive(Debug, Default)]
pub(crate) struct DrainGate {
    open: AtomicBool,
}

impl DrainGate {
    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Apply `status`, calling `purge` first on opt-out.
    pub(crate) fn apply(
        &self,
        status: PrivacyStatus,
        purge: impl FnOnce() -> DatabaseResult<usize>,
    ) -> DatabaseResult<usize> {
        match status {
            PrivacyStatus::OptedOut => {
                self.open.store(false, Ordering::SeqCst);
                let purged = purge()?;
                info!(purged, "Privacy opted out, queue purged and halted");
                Ok(purged)
            }
            PrivacyStatus::Unknown => {
                self.open.store(false, Ordering::SeqCst);
                info!("Privacy unknown, queue halted");
                Ok(0)
            }
            PrivacyStatus::OptedIn => {
                self.open.store(true, Ordering::SeqCst);
                info!("Privacy opted in, queue draining");
                Ok(0)
            }
        }
    }
}
