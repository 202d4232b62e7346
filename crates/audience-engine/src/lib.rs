//! Audience segmentation engine.
//!
//! Turns lifecycle, analytics and audience events into signal requests,
//! delivers them through a privacy-gated durable queue, and folds server
//! responses back into visitor profile state.
//!
//! # Architecture
//!
//! ```text
//! host bus ──events──▶ AudienceExtension (single task, owns ProfileState)
//!                          │ enqueue                ▲ HitCompletion
//!                          ▼                        │
//!                     DurableQueue ──peek──▶ HitProcessor ──GET──▶ server
//! ```
//!
//! All profile mutations happen on the extension task; the processor only
//! touches the queue and reports outcomes back over a channel.

mod error;
mod event;
mod extension;
mod hit;
mod host;
mod identity;
mod processor;
mod reconciler;
mod request;
mod response;
mod settings;
mod state;
mod transport;

#[cfg(test)]
mod tests;

pub use error::{AudienceError, AudienceResult};
pub use event::{keys, Event, EventData, EventId, EventKind, OutboundEvent, OutboundKind};
pub use extension::{AudienceExtension, ExtensionConfig, ExtensionParts};
pub use hit::{EventRef, Hit, HitOrigin};
pub use host::{ExtensionHost, RecordingHost};
pub use identity::{AuthState, CustomerId, VisitorIdentity};
pub use processor::{HitCompletion, HitOutcome, HitProcessor, RetryPolicy, Step};
pub use reconciler::{Reconciled, ResponseReconciler};
pub use request::{map_lifecycle_keys, opt_out_url, RequestContext};
pub use response::ServerResponsePayload;
pub use settings::{AudienceSettings, DEFAULT_TIMEOUT};
pub use state::ProfileState;
pub use transport::{HitTransport, HttpResponse, ReqwestTransport, TransportError};
