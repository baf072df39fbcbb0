//! TTS Cache configuration (spec §4.4, §6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TtsCacheConfig {
    #[serde(default = "default_entries")]
    pub tts_cache_entries: usize,
    #[serde(default = "default_bytes")]
    pub tts_cache_bytes: usize,
    /// Number of shards for the sharded LRU (spec §4.4 "mutations
    /// serialized per shard").
    #[serde(default = "default_shards")]
    pub shard_count: usize,
}

impl Default for TtsCacheConfig {
    fn default() -> Self {
        Self {
            tts_cache_entries: default_entries(),
            tts_cache_bytes: default_bytes(),
            shard_count: default_shards(),
        }
    }
}

fn default_entries() -> usize {
    4_096
}
fn default_bytes() -> usize {
    256 * 1024 * 1024
}
fn default_shards() -> usize {
    16
}
