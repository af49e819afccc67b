//! Engine configuration

use serde::{Deserialize, Serialize};

/// How a new score combines with the one already recorded when a completed
/// module is completed again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorePolicy {
    /// Keep the higher score
    #[default]
    Best,
    /// Keep the most recent score
    Latest,
}

impl ScorePolicy {
    pub fn merge(&self, recorded: Option<u8>, new: Option<u8>) -> Option<u8> {
        match (self, recorded, new) {
            (_, None, new) => new,
            (_, recorded, None) => recorded,
            (ScorePolicy::Best, Some(a), Some(b)) => Some(a.max(b)),
            (ScorePolicy::Latest, Some(_), Some(b)) => Some(b),
        }
    }
}

/// Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Score handling on re-completion
    #[serde(default)]
    pub score_policy: ScorePolicy,

    /// Prefix of generated certificate numbers
    #[serde(default = "default_certificate_prefix")]
    pub certificate_prefix: String,

    /// Write ledger entries for modules worth 0 XP and 0 coins
    #[serde(default)]
    pub grant_zero_rewards: bool,

    /// Broadcast channel capacity for progress events
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_certificate_prefix() -> String {
    "CERT".to_string()
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            score_policy: ScorePolicy::default(),
            certificate_prefix: default_certificate_prefix(),
            grant_zero_rewards: false,
            event_capacity: default_event_capacity(),
        }
    }
}

impl EngineConfig {
    /// Parse from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
