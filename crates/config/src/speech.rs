//! External-Speech-API client configuration (spec §4.3, §6).

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechClientConfig {
    #[serde(default = "default_worker_pool")]
    pub api_worker_pool: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_recognize_deadline_ms")]
    pub recognize_deadline_ms: u64,
    #[serde(default = "default_translate_deadline_ms")]
    pub translate_deadline_ms: u64,
    #[serde(default = "default_synthesize_deadline_ms")]
    pub synthesize_deadline_ms: u64,

    /// Max characters of prior translated text carried as context (spec
    /// glossary "Context snippet").
    #[serde(default = "default_context_chars")]
    pub context_snippet_chars: usize,

    /// Recognition below this confidence is treated as a no-op: nothing is
    /// translated, synthesized, or delivered, but a transcript entry is
    /// still recorded (spec §4.5 step 1).
    #[serde(default = "default_min_recognition_confidence")]
    pub min_recognition_confidence: f32,

    #[serde(default)]
    pub recognize_endpoint: Option<String>,
    #[serde(default)]
    pub translate_endpoint: Option<String>,
    #[serde(default)]
    pub synthesize_endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for SpeechClientConfig {
    fn default() -> Self {
        Self {
            api_worker_pool: default_worker_pool(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            recognize_deadline_ms: default_recognize_deadline_ms(),
            translate_deadline_ms: default_translate_deadline_ms(),
            synthesize_deadline_ms: default_synthesize_deadline_ms(),
            context_snippet_chars: default_context_chars(),
            min_recognition_confidence: default_min_recognition_confidence(),
            recognize_endpoint: None,
            translate_endpoint: None,
            synthesize_endpoint: None,
            api_key: None,
        }
    }
}

impl SpeechClientConfig {
    pub fn recognize_deadline(&self) -> Duration {
        Duration::from_millis(self.recognize_deadline_ms)
    }
    pub fn translate_deadline(&self) -> Duration {
        Duration::from_millis(self.translate_deadline_ms)
    }
    pub fn synthesize_deadline(&self) -> Duration {
        Duration::from_millis(self.synthesize_deadline_ms)
    }
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

fn default_worker_pool() -> usize {
    16
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    100
}
fn default_recognize_deadline_ms() -> u64 {
    6_000
}
fn default_translate_deadline_ms() -> u64 {
    3_000
}
fn default_synthesize_deadline_ms() -> u64 {
    4_000
}
fn default_context_chars() -> usize {
    150
}
fn default_min_recognition_confidence() -> f32 {
    0.4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_deadlines() {
        let cfg = SpeechClientConfig::default();
        assert_eq!(cfg.recognize_deadline_ms, 6_000);
        assert_eq!(cfg.translate_deadline_ms, 3_000);
        assert_eq!(cfg.synthesize_deadline_ms, 4_000);
        assert_eq!(cfg.api_worker_pool, 16);
        assert!(cfg.min_recognition_confidence > 0.0);
    }
}
