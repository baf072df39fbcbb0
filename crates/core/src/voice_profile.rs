//! Voice profile selection for synthesis
//!
//! `VoiceProfile` is the third component of the TTS Cache key (spec
//! §4.4): `(text, target_lang, voice_profile_ref or "default")`.

use crate::language::Language;
use crate::model::Participant;
use serde::{Deserialize, Serialize};

pub const DEFAULT_VOICE_PROFILE: &str = "default";

/// Minimum `voice_clone_quality_score` for a cloned voice to be trusted
/// for synthesis rather than falling back to the default voice.
const MIN_USABLE_CLONE_SCORE: f32 = 0.6;

/// Tier derived from a participant's voice-clone similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceCloneQuality {
    /// No clone was ever trained; synthesis uses the default voice.
    Unavailable,
    /// A clone exists but scored below the usable threshold.
    Low,
    /// Clone quality is high enough to synthesize with directly.
    Usable,
}

/// Derive voice-clone usability from a participant's recorded score. Pure
/// function over the record per spec §9.
pub fn voice_clone_quality_from_score(participant: &Participant) -> VoiceCloneQuality {
    match participant.voice_clone_quality_score {
        None => VoiceCloneQuality::Unavailable,
        Some(score) if score >= MIN_USABLE_CLONE_SCORE => VoiceCloneQuality::Usable,
        Some(_) => VoiceCloneQuality::Low,
    }
}

/// Voice selection passed to `TextToSpeech::synthesize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub language: Language,
    /// Voice identifier, or `DEFAULT_VOICE_PROFILE` when the participant
    /// has no `voice_profile_ref` configured.
    pub voice_id: String,
}

impl VoiceProfile {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            voice_id: DEFAULT_VOICE_PROFILE.to_string(),
        }
    }

    pub fn with_voice_id(mut self, voice_id: impl Into<String>) -> Self {
        let id = voice_id.into();
        self.voice_id = if id.is_empty() { DEFAULT_VOICE_PROFILE.to_string() } else { id };
        self
    }

    /// Cache-key component: `voice_profile_ref` or the literal `default`.
    pub fn cache_key_component(&self) -> &str {
        &self.voice_id
    }
}

#[derive(Debug, Clone)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub language: Language,
    pub gender: Option<VoiceGender>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceGender {
    Male,
    Female,
    Neutral,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn default_profile_uses_default_voice() {
        let vp = VoiceProfile::new(Language::canonicalize("en"));
        assert_eq!(vp.cache_key_component(), DEFAULT_VOICE_PROFILE);
    }

    #[test]
    fn empty_voice_id_falls_back_to_default() {
        let vp = VoiceProfile::new(Language::canonicalize("en")).with_voice_id("");
        assert_eq!(vp.cache_key_component(), DEFAULT_VOICE_PROFILE);
    }

    fn participant(score: Option<f32>) -> Participant {
        Participant {
            call_id: "call-1".to_string(),
            user_id: "u1".to_string(),
            spoken_lang: Language::canonicalize("en"),
            dubbing_required: false,
            voice_profile_ref: Some("clone-1".to_string()),
            voice_clone_quality_score: score,
            joined_at: Utc::now(),
            left_at: None,
        }
    }

    #[test]
    fn no_score_is_unavailable() {
        assert_eq!(voice_clone_quality_from_score(&participant(None)), VoiceCloneQuality::Unavailable);
    }

    #[test]
    fn low_score_is_low_quality() {
        assert_eq!(voice_clone_quality_from_score(&participant(Some(0.3))), VoiceCloneQuality::Low);
    }

    #[test]
    fn high_score_is_usable() {
        assert_eq!(voice_clone_quality_from_score(&participant(Some(0.9))), VoiceCloneQuality::Usable);
    }
}
