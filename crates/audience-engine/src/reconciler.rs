//! Folds server responses into the profile state.

use crate::error::AudienceResult;
use crate::response::ServerResponsePayload;
use crate::state::ProfileState;
use crate::transport::HitTransport;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// What applying one response did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reconciled {
    /// Whether uuid and profile were replaced.
    pub applied: bool,
    /// Destination URLs handed off for forwarding.
    pub forwarded: usize,
}

pub struct ResponseReconciler {
    transport: Arc<dyn HitTransport>,
}

impl ResponseReconciler {
    pub fn new(transport: Arc<dyn HitTransport>) -> Self {
        Self { transport }
    }

    /// Decode `body`, forward its destinations, and replace uuid and
    /// profile wholesale. An absent uuid clears the stored one.
    ///
    /// A body that doesn't decode leaves the state untouched.
    /// Must be called from within a tokio runtime.
    pub fn reconcile(
        &self,
        state: &mut ProfileState,
        body: &[u8],
        timeout: Duration,
    ) -> AudienceResult<Reconciled> {
        let payload = ServerResponsePayload::decode(body)?;

        let forwarded = self.forward_destinations(&payload.destinations(), timeout);
        let applied = state.apply_server_identity(
            payload.uuid().unwrap_or_default().to_string(),
            payload.segments(),
        );

        debug!(
            applied,
            forwarded,
            segments = state.visitor_profile().len(),
            "Server response reconciled"
        );

        Ok(Reconciled { applied, forwarded })
    }

    /// Fire one detached GET per valid destination. Outcomes are ignored.
    fn forward_destinations(&self, destinations: &[String], timeout: Duration) -> usize {
        let mut forwarded = 0;

        for dest in destinations {
            if dest.is_empty() {
                debug!("Skipping empty destination");
                continue;
            }

            match Url::parse(dest) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {
                    let transport = Arc::clone(&self.transport);
                    let url = String::from(url);
                    tokio::spawn(async move {
                        if let Err(e) = transport.get(&url, timeout).await {
                            debug!(url = %url, error = %e, "Destination forward failed");
                        }
                    });
                    forwarded += 1;
                }
                _ => warn!(dest = %dest, "Skipping malformed destination"),
            }
        }

        forwarded
    }
}
