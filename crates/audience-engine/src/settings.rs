//! Settings carried by configuration events.

use crate::event::{get_str, keys, EventData};
use audience_config_and_utils::PrivacyStatus;
use serde_json::Value;
use std::time::Duration;

/// Network timeout applied when configuration omits one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Current configuration as last observed on the bus.
///
/// Each configuration event replaces the settings wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct AudienceSettings {
    /// Audience Manager host, e.g. `dpm.demdex.net`.
    pub server: Option<String>,
    pub timeout: Duration,
    pub org_id: Option<String>,
    /// When set, signals piggy-back on analytics and lifecycle hits are
    /// not sent by this extension.
    pub aam_forwarding: bool,
    pub privacy: PrivacyStatus,
}

impl Default for AudienceSettings {
    fn default() -> Self {
        Self {
            server: None,
            timeout: DEFAULT_TIMEOUT,
            org_id: None,
            aam_forwarding: false,
            privacy: PrivacyStatus::Unknown,
        }
    }
}

impl AudienceSettings {
    pub fn from_event_data(data: &EventData) -> Self {
        let timeout = data
            .get(keys::AUDIENCE_TIMEOUT)
            .and_then(parse_timeout)
            .unwrap_or(DEFAULT_TIMEOUT);

        let privacy = get_str(data, keys::GLOBAL_PRIVACY)
            .map(PrivacyStatus::from_wire)
            .unwrap_or_default();

        Self {
            server: get_str(data, keys::AUDIENCE_SERVER)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            timeout,
            org_id: get_str(data, keys::ORG_ID).map(str::to_string),
            aam_forwarding: data
                .get(keys::AAM_FORWARDING)
                .and_then(Value::as_bool)
                .unwrap_or(false),
            privacy,
        }
    }
}

/// Timeout in seconds, integer or fractional. Non-positive or
/// unrepresentable values fall back to the default.
fn parse_timeout(value: &Value) -> Option<Duration> {
    let secs = value.as_f64()?;
    if secs <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}
