//! The audience extension: one task that owns all profile state and
//! handles every inbound event and hit completion in order.

use crate::error::{AudienceError, AudienceResult};
use crate::event::{
    get_str, keys, map_to_value, string_map, Event, EventData, EventId, EventKind,
    OutboundEvent, OutboundKind,
};
use crate::hit::{Hit, HitOrigin};
use crate::host::ExtensionHost;
use crate::identity::VisitorIdentity;
use crate::processor::{HitCompletion, HitOutcome, HitProcessor, RetryPolicy};
use crate::reconciler::ResponseReconciler;
use crate::request::{map_lifecycle_keys, opt_out_url, RequestContext};
use crate::settings::AudienceSettings;
use crate::state::ProfileState;
use crate::transport::HitTransport;
use audience_config_and_utils::{Config, PrivacyStatus, DEFAULT_PLATFORM};
use audience_database::{DurableQueue, ProfileStore};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Static options for an extension instance.
#[derive(Debug, Clone)]
pub struct ExtensionConfig {
    /// Sent as `d_ptfm`.
    pub platform: String,
    pub retry: RetryPolicy,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            platform: DEFAULT_PLATFORM.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&Config> for ExtensionConfig {
    fn from(config: &Config) -> Self {
        Self {
            platform: config.platform.clone(),
            retry: RetryPolicy::from_config(config),
        }
    }
}

/// Collaborators the extension runs against.
pub struct ExtensionParts {
    pub queue: Arc<dyn DurableQueue>,
    pub profiles: Arc<dyn ProfileStore>,
    pub transport: Arc<dyn HitTransport>,
    pub host: Arc<dyn ExtensionHost>,
}

enum Command {
    Event(Event),
    Snapshot(oneshot::Sender<ProfileState>),
}

/// Handle to a running extension.
pub struct AudienceExtension {
    commands: mpsc::Sender<Command>,
    actor: JoinHandle<()>,
    processor: JoinHandle<()>,
}

impl AudienceExtension {
    /// Load persisted profile and spawn the event task and hit processor.
    ///
    /// Draining stays halted until a configuration event opts in.
    pub fn start(config: ExtensionConfig, parts: ExtensionParts) -> Self {
        let state = match parts.profiles.load() {
            Ok(stored) => ProfileState::from_stored(stored),
            Err(e) => {
                warn!(error = %e, "Failed to load stored profile, starting empty");
                ProfileState::new()
            }
        };

        let wake = Arc::new(Notify::new());
        let (commands_tx, commands_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let processor = HitProcessor::new(
            Arc::clone(&parts.queue),
            Arc::clone(&parts.transport),
            completions_tx,
            Arc::clone(&wake),
            config.retry,
        );

        let actor = ExtensionActor {
            reconciler: ResponseReconciler::new(Arc::clone(&parts.transport)),
            platform: config.platform,
            settings: AudienceSettings::default(),
            identity: VisitorIdentity::default(),
            state,
            awaiting: HashSet::new(),
            queue: parts.queue,
            profiles: parts.profiles,
            transport: parts.transport,
            host: parts.host,
            wake,
        };

        info!(uuid = %actor.state.uuid(), "Audience extension started");

        Self {
            commands: commands_tx,
            actor: tokio::spawn(actor.run(commands_rx, completions_rx)),
            processor: tokio::spawn(processor.run()),
        }
    }

    /// Queue an inbound event for processing.
    pub async fn handle(&self, event: Event) -> AudienceResult<()> {
        self.commands
            .send(Command::Event(event))
            .await
            .map_err(|_| AudienceError::Stopped)
    }

    /// Current profile state, after every event handed in so far.
    pub async fn profile(&self) -> AudienceResult<ProfileState> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot(tx))
            .await
            .map_err(|_| AudienceError::Stopped)?;
        rx.await.map_err(|_| AudienceError::Stopped)
    }

    /// Finish pending events, then stop both tasks. Hits still queued stay
    /// persisted for the next start.
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(e) = self.actor.await {
            error!(error = %e, "Extension task failed");
        }
        self.processor.abort();
        let _ = self.processor.await;
        info!("Audience extension stopped");
    }
}

struct ExtensionActor {
    platform: String,
    settings: AudienceSettings,
    identity: VisitorIdentity,
    state: ProfileState,
    /// Content requests whose hit is still queued.
    awaiting: HashSet<EventId>,
    queue: Arc<dyn DurableQueue>,
    profiles: Arc<dyn ProfileStore>,
    transport: Arc<dyn HitTransport>,
    host: Arc<dyn ExtensionHost>,
    reconciler: ResponseReconciler,
    wake: Arc<Notify>,
}

impl ExtensionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<HitCompletion>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Event(event)) => self.handle_event(event),
                    Some(Command::Snapshot(reply)) => {
                        let _ = reply.send(self.state.clone());
                    }
                    None => break,
                },
                Some(completion) = completions.recv() => self.handle_completion(completion),
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        debug!(event_id = %event.id, kind = ?event.kind, "Handling event");

        match event.kind {
            EventKind::ConfigurationResponse => self.handle_configuration(&event),
            EventKind::AudienceRequestContent => self.handle_content_request(&event),
            EventKind::AudienceRequestIdentity => self.handle_identity_request(&event),
            EventKind::AudienceRequestReset => self.handle_reset(&event),
            EventKind::LifecycleResponse => self.handle_lifecycle(&event),
            EventKind::AnalyticsResponse => self.handle_analytics(&event),
            EventKind::IdentityResponse => {
                self.identity = VisitorIdentity::from_event_data(&event.data);
            }
        }
    }

    fn handle_configuration(&mut self, event: &Event) {
        self.settings = AudienceSettings::from_event_data(&event.data);

        let status = self.settings.privacy;
        let previous = self.state.privacy();
        if status != previous {
            info!(from = %previous, to = %status, "Privacy status changed");
            self.apply_privacy(status, &event.id);
        }
    }

    fn apply_privacy(&mut self, status: PrivacyStatus, version: &EventId) {
        if status.is_opted_out() {
            self.send_opt_out_hit();
            self.state.set_privacy(status);
            self.state.clear_identity();
            self.persist();
            self.publish(version);
        } else {
            self.state.set_privacy(status);
        }

        if let Err(e) = self.queue.on_privacy_change(status) {
            error!(error = %e, status = %status, "Failed to apply privacy change to queue");
        }

        if status.is_opted_out() {
            let pending: Vec<EventId> = self.awaiting.drain().collect();
            for request in pending {
                self.respond_content(request, Some(sentinel_profile()));
            }
        }

        self.wake.notify_one();
    }

    fn handle_content_request(&mut self, event: &Event) {
        if !self.state.privacy().is_opted_in() {
            debug!(
                event_id = %event.id,
                privacy = %self.state.privacy(),
                "Not opted in, answering with empty profile"
            );
            self.respond_content(event.id.clone(), Some(sentinel_profile()));
            return;
        }

        let traits = string_map(&event.data, keys::VISITOR_TRAITS);
        match self.enqueue_hit(&event.id, HitOrigin::Content, &traits) {
            Ok(()) => {
                self.awaiting.insert(event.id.clone());
            }
            Err(e) => warn!(event_id = %event.id, error = %e, "Dropping content request"),
        }
    }

    fn handle_lifecycle(&mut self, event: &Event) {
        if self.settings.aam_forwarding {
            debug!(event_id = %event.id, "Lifecycle data forwarded by analytics, skipping");
            return;
        }
        if !self.state.privacy().is_opted_in() {
            debug!(event_id = %event.id, "Not opted in, ignoring lifecycle data");
            return;
        }

        let context = string_map(&event.data, keys::LIFECYCLE_CONTEXT_DATA);
        let traits = map_lifecycle_keys(&context);
        if let Err(e) = self.enqueue_hit(&event.id, HitOrigin::Lifecycle, &traits) {
            warn!(event_id = %event.id, error = %e, "Dropping lifecycle hit");
        }
    }

    fn handle_analytics(&mut self, event: &Event) {
        if !self.settings.aam_forwarding {
            return;
        }
        let Some(response) = get_str(&event.data, keys::ANALYTICS_SERVER_RESPONSE) else {
            return;
        };
        if self.state.privacy().is_opted_out() {
            debug!(event_id = %event.id, "Opted out, ignoring analytics response");
            return;
        }

        self.apply_response(response.as_bytes(), &event.id);
    }

    fn handle_identity_request(&mut self, event: &Event) {
        let mut data = EventData::new();
        data.insert(
            keys::VISITOR_PROFILE.to_string(),
            map_to_value(self.state.visitor_profile()),
        );
        self.host.dispatch(OutboundEvent {
            kind: OutboundKind::AudienceResponseIdentity,
            response_to: event.id.clone(),
            data,
        });
    }

    fn handle_reset(&mut self, event: &Event) {
        info!("Resetting visitor identity");
        self.state.clear_identity();
        self.persist();
        self.publish(&event.id);
    }

    fn handle_completion(&mut self, completion: HitCompletion) {
        let request = completion.source.event_id;
        let is_content = completion.source.origin == HitOrigin::Content;

        if self.state.privacy().is_opted_out() {
            debug!(event_id = %request, "Opted out, discarding hit outcome");
            self.awaiting.remove(&request);
            return;
        }

        let applied = match completion.outcome {
            HitOutcome::Delivered(body) if body.is_empty() => false,
            HitOutcome::Delivered(body) => self.apply_response(&body, &request),
            HitOutcome::Dropped => false,
        };

        if is_content && self.awaiting.remove(&request) {
            let profile = applied.then(|| map_to_value(self.state.visitor_profile()));
            self.respond_content(request, profile);
        }
    }

    /// Reconcile a response body, then persist and publish. Returns whether
    /// the state changed.
    fn apply_response(&mut self, body: &[u8], version: &EventId) -> bool {
        match self
            .reconciler
            .reconcile(&mut self.state, body, self.settings.timeout)
        {
            Ok(result) if result.applied => {
                self.persist();
                self.publish(version);
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(event_id = %version, error = %e, "Discarding unreadable server response");
                false
            }
        }
    }

    fn enqueue_hit(
        &self,
        event_id: &EventId,
        origin: HitOrigin,
        traits: &BTreeMap<String, String>,
    ) -> AudienceResult<()> {
        let context = RequestContext {
            settings: &self.settings,
            identity: &self.identity,
            uuid: self.state.uuid(),
            platform: &self.platform,
        };
        let url = context.signal_url(traits)?;
        let hit = Hit::new(url, self.settings.timeout, event_id.clone(), origin);

        let record = self.queue.enqueue(&hit.encode()?)?;
        debug!(record_id = %record.id, event_id = %event_id, origin = ?origin, "Hit queued");

        self.wake.notify_one();
        Ok(())
    }

    fn send_opt_out_hit(&self) {
        let Some(server) = self.settings.server.as_deref() else {
            debug!("No server configured, skipping opt-out hit");
            return;
        };
        let uuid = self.state.uuid();
        if uuid.is_empty() {
            debug!("No uuid yet, skipping opt-out hit");
            return;
        }

        let url = match opt_out_url(server, uuid) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Failed to build opt-out hit");
                return;
            }
        };

        let transport = Arc::clone(&self.transport);
        let timeout = self.settings.timeout;
        tokio::spawn(async move {
            if let Err(e) = transport.get(&url, timeout).await {
                debug!(error = %e, "Opt-out hit failed");
            }
        });
    }

    fn respond_content(&self, request: EventId, profile: Option<Value>) {
        let mut data = EventData::new();
        if let Some(profile) = profile {
            data.insert(keys::VISITOR_PROFILE.to_string(), profile);
        }
        self.host.dispatch(OutboundEvent {
            kind: OutboundKind::AudienceResponseContent,
            response_to: request,
            data,
        });
    }

    fn persist(&self) {
        if let Err(e) = self.profiles.save(&self.state.to_stored()) {
            error!(error = %e, "Failed to persist profile");
        }
    }

    fn publish(&self, version: &EventId) {
        self.host
            .publish_shared_state(version, self.state.shared_state());
    }
}

/// Profile sent when no real answer is possible: `{"": ""}`.
fn sentinel_profile() -> Value {
    json!({ "": "" })
}
