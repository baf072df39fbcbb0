//! External speech-processing traits (spec §4.3)
//!
//! Implementations run on a bounded worker pool because the real backends
//! are blocking HTTP calls against rate-limited third-party APIs; these
//! traits themselves are backend-agnostic.

use async_trait::async_trait;
use crate::audio::PcmBytes;
use crate::error::Error;
use crate::language::Language;
use crate::voice_profile::{VoiceInfo, VoiceProfile};

/// Result of a recognize call.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub text: String,
    pub confidence: f32,
}

#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    async fn recognize(&self, pcm: &PcmBytes, source_lang: &Language) -> Result<Recognition, Error>;

    fn model_name(&self) -> &str;
}

#[async_trait]
pub trait Translator: Send + Sync + 'static {
    /// Translate `text` from `source_lang` to `target_lang`. `context`
    /// carries up to ~150 chars of prior translated text for the same
    /// (call, target_lang), used to disambiguate pronouns (spec §4.3,
    /// glossary "Context snippet").
    async fn translate(
        &self,
        text: &str,
        source_lang: &Language,
        target_lang: &Language,
        context: Option<&str>,
    ) -> Result<String, Error>;
}

#[async_trait]
pub trait TextToSpeech: Send + Sync + 'static {
    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<PcmBytes, Error>;

    fn available_voices(&self) -> &[VoiceInfo];
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoStt;

    #[async_trait]
    impl SpeechToText for EchoStt {
        async fn recognize(&self, _pcm: &PcmBytes, _source_lang: &Language) -> Result<Recognition, Error> {
            Ok(Recognition {
                text: "hello".to_string(),
                confidence: 0.99,
            })
        }

        fn model_name(&self) -> &str {
            "echo-stt"
        }
    }

    #[tokio::test]
    async fn mock_stt_recognizes() {
        let stt = EchoStt;
        let pcm = PcmBytes::new(vec![0u8; 4]);
        let result = stt.recognize(&pcm, &Language::canonicalize("en")).await.unwrap();
        assert_eq!(result.text, "hello");
    }
}
