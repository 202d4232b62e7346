//! The host event hub as seen by the extension.

use crate::event::{EventData, EventId, OutboundEvent};
use parking_lot::Mutex;

/// Outbound side of the host event bus.
///
/// Implementations must not block: both calls happen on the extension's
/// event-processing task.
pub trait ExtensionHost: Send + Sync {
    /// Dispatch a response event.
    fn dispatch(&self, event: OutboundEvent);

    /// Publish shared state `{uuid, aamprofile}` versioned at `version`.
    fn publish_shared_state(&self, version: &EventId, state: EventData);
}

/// Host that records everything it is given.
#[derive(Default)]
pub struct RecordingHost {
    dispatched: Mutex<Vec<OutboundEvent>>,
    shared_states: Mutex<Vec<(EventId, EventData)>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatched(&self) -> Vec<OutboundEvent> {
        self.dispatched.lock().clone()
    }

    /// Responses paired with `request`.
    pub fn responses_to(&self, request: &EventId) -> Vec<OutboundEvent> {
        self.dispatched
            .lock()
            .iter()
            .filter(|e| &e.response_to == request)
            .cloned()
            .collect()
    }

    pub fn shared_states(&self) -> Vec<(EventId, EventData)> {
        self.shared_states.lock().clone()
    }

    pub fn last_shared_state(&self) -> Option<EventData> {
        self.shared_states.lock().last().map(|(_, s)| s.clone())
    }
}

impl ExtensionHost for RecordingHost {
    fn dispatch(&self, event: OutboundEvent) {
        self.dispatched.lock().push(event);
    }

    fn publish_shared_state(&self, version: &EventId, state: EventData) {
        self.shared_states.lock().push((version.clone(), state));
    }
}
