//! Server response payload.

use crate::error::{AudienceError, AudienceResult};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Decoded body of a signal response.
///
/// Entries are kept loosely typed so one malformed destination or segment
/// doesn't invalidate the rest.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServerResponsePayload {
    #[serde(default)]
    uuid: Option<Value>,
    #[serde(default)]
    dests: Option<Vec<Value>>,
    #[serde(default)]
    stuff: Option<Vec<Value>>,
}

impl ServerResponsePayload {
    pub fn decode(body: &[u8]) -> AudienceResult<Self> {
        let value: Value = serde_json::from_slice(body)?;
        if !value.is_object() {
            return Err(AudienceError::InvalidResponse(
                "expected a JSON object".to_string(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Server-assigned uuid. A missing or non-string value counts as absent.
    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_ref().and_then(Value::as_str)
    }

    /// Destination URLs in server order. Entries may be plain strings or
    /// `{"c": url}` objects; anything else yields an empty string so it is
    /// skipped, not dropped silently.
    pub fn destinations(&self) -> Vec<String> {
        self.dests
            .iter()
            .flatten()
            .map(|dest| match dest {
                Value::String(s) => s.clone(),
                Value::Object(map) => map
                    .get("c")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                _ => String::new(),
            })
            .collect()
    }

    /// Segments with both a cookie key and value. An empty key is still a
    /// key.
    pub fn segments(&self) -> BTreeMap<String, String> {
        self.stuff
            .iter()
            .flatten()
            .filter_map(|entry| {
                let key = entry.get("cookieKey")?.as_str()?;
                let value = entry.get("cookieValue")?.as_str()?;
                Some((key.to_string(), value.to_string()))
            })
            .collect()
    }
}
