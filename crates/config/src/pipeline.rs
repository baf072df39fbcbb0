//! Chunker / speech-detector configuration — the named constants in
//! spec §6.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
    #[serde(default = "default_max_utterance_ms")]
    pub max_utterance_ms: u64,
    #[serde(default = "default_min_utterance_ms")]
    pub min_utterance_ms: u64,
    #[serde(default = "default_rms_threshold")]
    pub rms_silence_threshold: i32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pause_ms: default_pause_ms(),
            max_utterance_ms: default_max_utterance_ms(),
            min_utterance_ms: default_min_utterance_ms(),
            rms_silence_threshold: default_rms_threshold(),
        }
    }
}

fn default_pause_ms() -> u64 {
    400
}
fn default_max_utterance_ms() -> u64 {
    2_500
}
fn default_min_utterance_ms() -> u64 {
    150
}
fn default_rms_threshold() -> i32 {
    350
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.pause_ms, 400);
        assert_eq!(cfg.max_utterance_ms, 2_500);
        assert_eq!(cfg.min_utterance_ms, 150);
        assert_eq!(cfg.rms_silence_threshold, 350);
    }
}
