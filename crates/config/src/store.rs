//! Call-state store / Recipient-Map configuration (spec §4.6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// How long a derived Recipient-Map entry is cached before the next
    /// lookup recomputes it from the call-state store, absent an explicit
    /// join/leave/mute invalidation (spec §4.6 "short-TTL cache").
    #[serde(default = "default_recipient_map_ttl_ms")]
    pub recipient_map_ttl_ms: u64,

    /// Whether the speaker's own language is included as a delivery target
    /// (spec §9 Open Questions: "leave as a policy knob, default off" — a
    /// speaker does not receive their own translation back by default).
    #[serde(default)]
    pub include_speaker: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            recipient_map_ttl_ms: default_recipient_map_ttl_ms(),
            include_speaker: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    InMemory,
    Postgres,
}

fn default_recipient_map_ttl_ms() -> u64 {
    2_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.recipient_map_ttl_ms, 2_000);
        assert_eq!(cfg.backend, StoreBackend::InMemory);
        assert!(!cfg.include_speaker);
    }
}
