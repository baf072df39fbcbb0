//! Data model entities (spec §3)
//!
//! These are plain records with a handful of pure derivation functions,
//! not a deep object hierarchy — join/leave/mute mutate the call-state
//! store, not these structs in place (spec §9 "replace with a plain
//! record and a small set of pure functions").

use crate::language::Language;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type SessionId = String;
pub type CallId = String;
pub type UserId = String;
pub type UtteranceId = String;

/// One active call connection for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub call_id: CallId,
    pub user_id: UserId,
    pub source_lang: Language,
    /// The language this user wants translations delivered in. Usually
    /// equal to `source_lang`; kept distinct because a participant can in
    /// principle listen in a language other than the one they speak.
    pub target_lang: Language,
    pub muted: bool,
    pub connected_at: DateTime<Utc>,
}

/// Status of a shared multi-party conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Initiating,
    Ringing,
    Ongoing,
    Ended,
    Missed,
}

/// A shared multi-party conversation. `call_language` is immutable once
/// set by the caller (spec §3 invariants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub call_id: CallId,
    pub call_language: Language,
    pub status: CallStatus,
    pub created_at: DateTime<Utc>,
}

/// A user's role in a call. `spoken_lang` is immutable for a given row
/// once created (spec §3 invariants); joins/leaves are new events applied
/// through the call-state store, not in-place field mutation beyond
/// `left_at`/`dubbing_required` bookkeeping that the store itself owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub call_id: CallId,
    pub user_id: UserId,
    pub spoken_lang: Language,
    pub dubbing_required: bool,
    pub voice_profile_ref: Option<String>,
    /// Similarity score from the voice-cloning pipeline for
    /// `voice_profile_ref`, in `[0, 1]`. `None` when no clone was ever
    /// trained for this participant. Drives `voice_clone_quality_from_score`.
    pub voice_clone_quality_score: Option<f32>,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}

/// Derive whether a participant needs synthesized (dubbed) audio rather
/// than captions only. Pure function over the record per spec §9.
pub fn determine_dubbing_required(participant: &Participant, call: &Call) -> bool {
    participant.spoken_lang != call.call_language
}

/// A pause-bounded segment of one speaker's PCM, produced by the Chunker
/// and consumed exactly once by the Translation Processor.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub utterance_id: UtteranceId,
    pub call_id: CallId,
    pub speaker_id: UserId,
    pub source_lang: Language,
    pub pcm_bytes: crate::audio::PcmBytes,
    pub start_ts_ms: u64,
    pub end_ts_ms: u64,
}

impl Utterance {
    pub fn duration_ms(&self) -> u64 {
        self.end_ts_ms.saturating_sub(self.start_ts_ms)
    }
}

/// Per-language output of one utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerLanguageResult {
    pub target_lang: Language,
    pub text: String,
    /// Absent when synthesis was skipped (passthrough policy, or
    /// permanent synthesis failure for this language only).
    pub audio_bytes: Option<Vec<u8>>,
    pub recipient_ids: Vec<UserId>,
}

/// Per-utterance output, published once on the call's Delivery Bus
/// channel and persisted as one TranscriptEntry per target language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResult {
    pub utterance_id: UtteranceId,
    pub call_id: CallId,
    pub speaker_id: UserId,
    pub original_text: String,
    pub source_lang: Language,
    pub per_language: Vec<PerLanguageResult>,
    pub timestamp_ms: u64,
}

impl TranslationResult {
    /// All recipient ids across every target language, for Delivery Bus
    /// framing (spec §4.8: "each published record carries recipient_ids").
    pub fn all_recipient_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self
            .per_language
            .iter()
            .flat_map(|pl| pl.recipient_ids.iter().cloned())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Append-only historical record of one utterance's translation into one
/// target language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub call_id: CallId,
    pub speaker_id: UserId,
    pub original_lang: Language,
    pub original_text: String,
    pub target_lang: Language,
    pub translated_text: String,
    pub timestamp_ms: u64,
    pub tts_method: TtsMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsMethod {
    Synthesized,
    CacheHit,
    Passthrough,
    Skipped,
}

/// Map of target language code -> recipient user ids, as returned by the
/// Recipient-Map (spec §4.6).
pub type RecipientTargets = HashMap<String, Vec<UserId>>;
