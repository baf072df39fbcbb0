//! Ingest Stream / Delivery Bus configuration (spec §4.7, §4.8, §6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub backend: TransportBackend,

    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Max queued records per session before the producer starts
    /// dropping the oldest (spec §4.7 "Backpressure").
    #[serde(default = "default_backpressure_max")]
    pub stream_backpressure_max: usize,

    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// How long a claimed-but-unacked record is considered in-flight
    /// before another worker may reclaim it (spec §4.7 "Replay for
    /// crashed workers").
    #[serde(default = "default_visibility_timeout_ms")]
    pub visibility_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            backend: TransportBackend::default(),
            redis_url: default_redis_url(),
            stream_backpressure_max: default_backpressure_max(),
            consumer_group: default_consumer_group(),
            visibility_timeout_ms: default_visibility_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportBackend {
    /// Single-process, in-memory channels. Suitable for tests and local
    /// development; does not survive a process restart.
    #[default]
    InMemory,
    /// Redis streams (ingest, consumer-group semantics) + pub/sub
    /// (delivery), for a multi-process deployment.
    Redis,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_backpressure_max() -> usize {
    64
}
fn default_consumer_group() -> String {
    "audio_processors".to_string()
}
fn default_visibility_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "default_reconnect_grace_ms")]
    pub reconnect_grace_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            reconnect_grace_ms: default_reconnect_grace_ms(),
        }
    }
}

fn default_heartbeat_interval_ms() -> u64 {
    5_000
}
fn default_heartbeat_timeout_ms() -> u64 {
    30_000
}
fn default_reconnect_grace_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let t = TransportConfig::default();
        assert_eq!(t.stream_backpressure_max, 64);
        assert_eq!(t.backend, TransportBackend::InMemory);

        let h = HeartbeatConfig::default();
        assert_eq!(h.heartbeat_interval_ms, 5_000);
        assert_eq!(h.heartbeat_timeout_ms, 30_000);
        assert_eq!(h.reconnect_grace_ms, 10_000);
    }
}
