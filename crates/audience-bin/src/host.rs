//! Host that writes outbound events and shared state as JSON lines.

use audience_engine::{EventData, EventId, ExtensionHost, OutboundEvent};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::Write;
use tracing::warn;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum HostLine<'a> {
    Response(&'a OutboundEvent),
    SharedState {
        version: &'a EventId,
        state: &'a EventData,
    },
}

pub struct JsonLinesHost<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesHost<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn write_line(&self, line: &HostLine<'_>) {
        let mut out = self.out.lock();
        if let Err(e) = write_json_line(&mut *out, line) {
            warn!(error = %e, "Failed to write host output");
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

fn write_json_line<W: Write>(out: &mut W, line: &HostLine<'_>) -> std::io::Result<()> {
    serde_json::to_writer(&mut *out, line)?;
    out.write_all(b"\n")?;
    out.flush()
}

impl<W: Write + Send> ExtensionHost for JsonLinesHost<W> {
    fn dispatch(&self, event: OutboundEvent) {
        self.write_line(&HostLine::Response(&event));
    }

    fn publish_shared_state(&self, version: &EventId, state: EventData) {
        self.write_line(&HostLine::SharedState {
            version,
            state: &state,
        });
    }
}
