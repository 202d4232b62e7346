//! Hit processor: drains the durable queue one hit at a time.

use crate::error::AudienceResult;
use crate::hit::{EventRef, Hit};
use crate::transport::{HitTransport, HttpResponse};
use audience_config_and_utils::Config;
use audience_database::{DurableQueue, RecordId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Exponential backoff for retryable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.retry_base(), config.retry_max())
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Terminal result of a hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitOutcome {
    /// The server answered with a body worth reconciling (possibly empty).
    Delivered(Vec<u8>),
    /// The server rejected the hit; it won't be retried.
    Dropped,
}

/// Sent back to the event-processing task once a hit leaves the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitCompletion {
    pub source: EventRef,
    pub outcome: HitOutcome,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Disposition {
    Delivered(Vec<u8>),
    Retry,
    Drop,
}

/// Statuses worth retrying when the server sent nothing back.
const RETRYABLE_STATUSES: &[u16] = &[408, 429, 502, 503, 504];

pub(crate) fn classify(response: HttpResponse) -> Disposition {
    if response.is_success() || !response.body.is_empty() {
        Disposition::Delivered(response.body)
    } else if RETRYABLE_STATUSES.contains(&response.status) {
        Disposition::Retry
    } else {
        Disposition::Drop
    }
}

/// What one pass of the drain loop did.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    /// Nothing to send, or draining is halted.
    Idle,
    /// The head record left the queue.
    Advanced,
    /// The head record stays; try again after a backoff.
    Retry,
}

/// Single drain task. At most one hit is in flight, and the head record is
/// removed only after a terminal outcome.
pub struct HitProcessor {
    queue: Arc<dyn DurableQueue>,
    transport: Arc<dyn HitTransport>,
    completions: mpsc::UnboundedSender<HitCompletion>,
    wake: Arc<Notify>,
    retry: RetryPolicy,
}

impl HitProcessor {
    pub fn new(
        queue: Arc<dyn DurableQueue>,
        transport: Arc<dyn HitTransport>,
        completions: mpsc::UnboundedSender<HitCompletion>,
        wake: Arc<Notify>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            transport,
            completions,
            wake,
            retry,
        }
    }

    /// Run until the completion receiver goes away.
    pub async fn run(self) {
        info!(
            retry_base_ms = self.retry.base.as_millis() as u64,
            retry_max_ms = self.retry.max.as_millis() as u64,
            "Starting hit processor"
        );

        let mut failures: u32 = 0;

        loop {
            if self.completions.is_closed() {
                debug!("Completion channel closed, stopping hit processor");
                return;
            }

            match self.process_next().await {
                Ok(Step::Advanced) => failures = 0,
                Ok(Step::Idle) => {
                    failures = 0;
                    self.wake.notified().await;
                }
                Ok(Step::Retry) => {
                    failures = failures.saturating_add(1);
                    let delay = self.retry.delay_for(failures);
                    debug!(attempt = failures, delay_ms = delay.as_millis() as u64, "Backing off");
                    self.backoff(delay).await;
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = self.retry.delay_for(failures);
                    error!(error = %e, delay_ms = delay.as_millis() as u64, "Queue error in hit processor");
                    self.backoff(delay).await;
                }
            }
        }
    }

    /// Send the head record, if draining is allowed.
    pub async fn process_next(&self) -> AudienceResult<Step> {
        if !self.queue.is_draining() {
            return Ok(Step::Idle);
        }

        let Some(record) = self.queue.peek_oldest()? else {
            return Ok(Step::Idle);
        };

        let hit = match Hit::decode(&record.payload) {
            Ok(hit) => hit,
            Err(e) => {
                warn!(record_id = %record.id, error = %e, "Dropping unreadable hit record");
                self.queue.remove(record.id)?;
                return Ok(Step::Advanced);
            }
        };

        debug!(record_id = %record.id, url = %hit.url, "Sending hit");

        let response = match self.transport.get(&hit.url, hit.timeout).await {
            Ok(response) => response,
            Err(e) => {
                debug!(record_id = %record.id, error = %e, "Hit not sent, will retry");
                return Ok(Step::Retry);
            }
        };

        let status = response.status;
        match classify(response) {
            Disposition::Delivered(body) => {
                debug!(record_id = %record.id, status, body_len = body.len(), "Hit delivered");
                self.finish(record.id, hit.source, HitOutcome::Delivered(body))?;
                Ok(Step::Advanced)
            }
            Disposition::Retry => {
                debug!(record_id = %record.id, status, "Retryable status, will retry");
                Ok(Step::Retry)
            }
            Disposition::Drop => {
                warn!(record_id = %record.id, status, "Hit rejected by server, dropping");
                self.finish(record.id, hit.source, HitOutcome::Dropped)?;
                Ok(Step::Advanced)
            }
        }
    }

    /// Remove the record and report its outcome. A record purged while in
    /// flight has no outcome.
    fn finish(&self, id: RecordId, source: EventRef, outcome: HitOutcome) -> AudienceResult<()> {
        if !self.queue.remove(id)? {
            debug!(record_id = %id, "Hit purged while in flight, outcome discarded");
            return Ok(());
        }

        if self
            .completions
            .send(HitCompletion { source, outcome })
            .is_err()
        {
            debug!("Completion receiver gone, outcome discarded");
        }
        Ok(())
    }

    /// Sleep for `delay`, cutting it short only when draining is halted.
    async fn backoff(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return,
                _ = self.wake.notified() => {
                    if !self.queue.is_draining() {
                        return;
                    }
                }
            }
        }
    }
}
