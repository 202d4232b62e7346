//! Inbound and outbound events exchanged with the host event bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Opaque key/value payload carried by every event.
pub type EventData = serde_json::Map<String, Value>;

/// Well-known event data keys.
pub mod keys {
    // Configuration
    pub const GLOBAL_PRIVACY: &str = "global.privacy";
    pub const AUDIENCE_SERVER: &str = "audience.server";
    pub const AUDIENCE_TIMEOUT: &str = "audience.timeout";
    pub const ORG_ID: &str = "experienceCloud.org";
    pub const AAM_FORWARDING: &str = "analytics.aamForwardingEnabled";

    // Analytics / lifecycle
    pub const ANALYTICS_SERVER_RESPONSE: &str = "analyticsserverresponse";
    pub const LIFECYCLE_CONTEXT_DATA: &str = "lifecyclecontextdata";

    // Audience requests and responses, shared state
    pub const VISITOR_TRAITS: &str = "aamtraits";
    pub const VISITOR_PROFILE: &str = "aamprofile";
    pub const UUID: &str = "uuid";

    // Visitor identity
    pub const MID: &str = "mid";
    pub const BLOB: &str = "blob";
    pub const LOCATION_HINT: &str = "locationhint";
    pub const VISITOR_IDS: &str = "visitoridslist";
}

/// Identifier of an event on the host bus. Used both to pair responses
/// with requests and to version shared state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Event types the extension listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    LifecycleResponse,
    AnalyticsResponse,
    AudienceRequestContent,
    AudienceRequestIdentity,
    AudienceRequestReset,
    ConfigurationResponse,
    IdentityResponse,
}

/// An inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: EventId,
    pub kind: EventKind,
    #[serde(default)]
    pub data: EventData,
}

impl Event {
    pub fn new(kind: EventKind, data: EventData) -> Self {
        Self {
            id: EventId::new(),
            kind,
            data,
        }
    }

    /// Build an event from a JSON object literal. Non-object values yield
    /// empty data.
    pub fn from_json(kind: EventKind, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => EventData::new(),
        };
        Self::new(kind, data)
    }
}

/// Event types the extension emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutboundKind {
    AudienceResponseContent,
    AudienceResponseIdentity,
}

/// A response paired with the request that triggered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEvent {
    pub kind: OutboundKind,
    pub response_to: EventId,
    pub data: EventData,
}

impl OutboundEvent {
    /// The visitor profile carried by this response, if any.
    pub fn visitor_profile(&self) -> Option<BTreeMap<String, String>> {
        self.data
            .get(keys::VISITOR_PROFILE)
            .map(|_| string_map(&self.data, keys::VISITOR_PROFILE))
    }
}

/// Read `key` as a non-empty string.
pub(crate) fn get_str<'a>(data: &'a EventData, key: &str) -> Option<&'a str> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Read `key` as a flat string map. Numbers and booleans are stringified;
/// nulls, arrays and nested objects are skipped.
pub(crate) fn string_map(data: &EventData, key: &str) -> BTreeMap<String, String> {
    let Some(Value::Object(map)) = data.get(key) else {
        return BTreeMap::new();
    };

    map.iter()
        .filter_map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((k.clone(), value))
        })
        .collect()
}

/// Wrap a string map as a JSON object value.
pub(crate) fn map_to_value(map: &BTreeMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}
