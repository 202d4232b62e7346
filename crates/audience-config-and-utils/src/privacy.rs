//! Privacy (consent) status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Consent state declared by the host through configuration.
///
/// Only [`PrivacyStatus::OptedIn`] allows hits to be queued and sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PrivacyStatus {
    #[serde(rename = "optedin")]
    OptedIn,
    #[serde(rename = "optedout")]
    OptedOut,
    #[default]
    #[serde(rename = "optunknown")]
    Unknown,
}

impl PrivacyStatus {
    /// Parse the wire value used by `global.privacy`.
    ///
    /// Anything unrecognized is treated as unknown rather than opted in.
    pub fn from_wire(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "optedin" => Self::OptedIn,
            "optedout" => Self::OptedOut,
            _ => Self::Unknown,
        }
    }

    /// Wire value for this status.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::OptedIn => "optedin",
            Self::OptedOut => "optedout",
            Self::Unknown => "optunknown",
        }
    }

    pub fn is_opted_in(&self) -> bool {
        matches!(self, Self::OptedIn)
    }

    pub fn is_opted_out(&self) -> bool {
        matches!(self, Self::OptedOut)
    }
}

impl fmt::Display for PrivacyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}
