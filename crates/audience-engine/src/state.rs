//! Visitor profile state owned by the event-processing task.

use crate::event::{keys, map_to_value, EventData};
use audience_config_and_utils::PrivacyStatus;
use audience_database::StoredProfile;
use serde_json::Value;
use std::collections::BTreeMap;

/// Server-assigned uuid, the segment map, and the privacy status that
/// guards both.
///
/// Mutated only from the extension's event-processing task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileState {
    uuid: String,
    visitor_profile: BTreeMap<String, String>,
    privacy: PrivacyStatus,
}

impl ProfileState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore persisted identity. Privacy starts unknown until
    /// configuration declares it.
    pub fn from_stored(stored: StoredProfile) -> Self {
        Self {
            uuid: stored.uuid,
            visitor_profile: stored.visitor_profile,
            privacy: PrivacyStatus::Unknown,
        }
    }

    pub fn to_stored(&self) -> StoredProfile {
        StoredProfile {
            uuid: self.uuid.clone(),
            visitor_profile: self.visitor_profile.clone(),
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn visitor_profile(&self) -> &BTreeMap<String, String> {
        &self.visitor_profile
    }

    pub fn privacy(&self) -> PrivacyStatus {
        self.privacy
    }

    /// Record a new privacy status. Returns true if it changed.
    pub fn set_privacy(&mut self, status: PrivacyStatus) -> bool {
        let changed = self.privacy != status;
        self.privacy = status;
        changed
    }

    pub fn clear_identity(&mut self) {
        self.uuid.clear();
        self.visitor_profile.clear();
    }

    /// Replace uuid and profile with a server's answer.
    ///
    /// Refused while opted out, so a response that lands after the opt-out
    /// can't bring back cleared identity. Returns whether it was applied.
    pub fn apply_server_identity(
        &mut self,
        uuid: String,
        visitor_profile: BTreeMap<String, String>,
    ) -> bool {
        if self.privacy.is_opted_out() {
            return false;
        }
        self.uuid = uuid;
        self.visitor_profile = visitor_profile;
        true
    }

    /// Shared-state payload: `{"uuid": .., "aamprofile": {..}}`.
    pub fn shared_state(&self) -> EventData {
        let mut data = EventData::new();
        data.insert(keys::UUID.to_string(), Value::String(self.uuid.clone()));
        data.insert(
            keys::VISITOR_PROFILE.to_string(),
            map_to_value(&self.visitor_profile),
        );
        data
    }
}
