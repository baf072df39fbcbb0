//! Shared types and traits for the real-time audio translation relay
//!
//! This crate provides the foundational types used across every other
//! crate in the workspace:
//! - Core traits for pluggable speech backends (STT, translate, TTS)
//! - Raw PCM audio helpers
//! - Language code canonicalization
//! - The call/session/utterance/translation-result data model (spec §3)
//! - The crate-wide error type

pub mod audio;
pub mod error;
pub mod language;
pub mod model;
pub mod voice_profile;
pub mod traits;

pub use audio::{PcmBytes, SAMPLE_RATE_HZ, BYTES_PER_SAMPLE};
pub use error::{Error, Result};
pub use language::Language;
pub use model::{
    Call, CallStatus, Participant, PerLanguageResult, RecipientTargets, Session, TranscriptEntry,
    TranslationResult, TtsMethod, Utterance, determine_dubbing_required,
};
pub use voice_profile::{
    voice_clone_quality_from_score, VoiceCloneQuality, VoiceGender, VoiceInfo, VoiceProfile,
    DEFAULT_VOICE_PROFILE,
};
pub use traits::{Recognition, SpeechToText, TextToSpeech, Translator};
