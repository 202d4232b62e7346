//! Visitor identity published by the identity extension.

use crate::event::{get_str, keys, EventData};
use serde_json::Value;

/// Authentication state attached to a customer id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Unknown = 0,
    Authenticated = 1,
    LoggedOut = 2,
}

impl AuthState {
    fn from_value(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_i64) {
            Some(1) => AuthState::Authenticated,
            Some(2) => AuthState::LoggedOut,
            _ => AuthState::Unknown,
        }
    }
}

/// A customer-supplied id synced with the visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerId {
    pub id_type: String,
    pub id: String,
    pub auth_state: AuthState,
}

/// Identity values folded into every signal request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitorIdentity {
    pub ecid: Option<String>,
    pub blob: Option<String>,
    pub location_hint: Option<String>,
    pub customer_ids: Vec<CustomerId>,
}

impl VisitorIdentity {
    pub fn from_event_data(data: &EventData) -> Self {
        // The hint arrives as a number from some hosts.
        let location_hint = match data.get(keys::LOCATION_HINT) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let customer_ids = data
            .get(keys::VISITOR_IDS)
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(parse_customer_id).collect())
            .unwrap_or_default();

        Self {
            ecid: get_str(data, keys::MID).map(str::to_string),
            blob: get_str(data, keys::BLOB).map(str::to_string),
            location_hint,
            customer_ids,
        }
    }
}

fn parse_customer_id(value: &Value) -> Option<CustomerId> {
    let entry = value.as_object()?;
    let id_type = entry.get("id_type").and_then(Value::as_str)?;
    let id = entry.get("id").and_then(Value::as_str)?;
    if id_type.is_empty() || id.is_empty() {
        return None;
    }
    Some(CustomerId {
        id_type: id_type.to_string(),
        id: id.to_string(),
        auth_state: AuthState::from_value(entry.get("authentication_state")),
    })
}
