//! Hit records: the unit persisted in the durable queue.
//!
//! A hit is encoded as JSON with a fixed field order so a record written
//! by one process decodes identically in the next.

use crate::error::{AudienceError, AudienceResult};
use crate::event::EventId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which kind of event produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HitOrigin {
    /// An audience content request; someone is waiting for a response.
    Content,
    /// A lifecycle response; nobody is waiting.
    Lifecycle,
}

/// The originating event of a hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRef {
    pub event_id: EventId,
    pub origin: HitOrigin,
}

/// One outbound signal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub url: String,
    pub timeout: Duration,
    pub source: EventRef,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HitPayload {
    url: String,
    timeout_ms: u64,
    event_id: String,
    origin: HitOrigin,
}

impl Hit {
    pub fn new(url: String, timeout: Duration, event_id: EventId, origin: HitOrigin) -> Self {
        Self {
            url,
            timeout,
            source: EventRef { event_id, origin },
        }
    }

    pub fn encode(&self) -> AudienceResult<Vec<u8>> {
        let payload = HitPayload {
            url: self.url.clone(),
            timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            event_id: self.source.event_id.as_str().to_string(),
            origin: self.source.origin,
        };
        Ok(serde_json::to_vec(&payload)?)
    }

    /// Decode a persisted record. Anything that is not a well-formed hit
    /// with a non-empty URL is rejected.
    pub fn decode(bytes: &[u8]) -> AudienceResult<Self> {
        let payload: HitPayload = serde_json::from_slice(bytes)
            .map_err(|e| AudienceError::InvalidHit(e.to_string()))?;

        if payload.url.is_empty() {
            return Err(AudienceError::InvalidHit("empty url".to_string()));
        }

        Ok(Self::new(
            payload.url,
            Duration::from_millis(payload.timeout_ms),
            EventId::from_string(payload.event_id),
            payload.origin,
        ))
    }
}
