//! Postgres-backed call-state and transcript stores, for a deployment
//! that needs call history to survive a process restart.
//!
//! Schema (spec §3 data model, minimal routing columns only — this isn't
//! a general-purpose call-detail-record warehouse):
//!
//! ```sql
//! CREATE TABLE calls (
//!     call_id TEXT PRIMARY KEY,
//!     call_language TEXT NOT NULL,
//!     status TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE participants (
//!     call_id TEXT NOT NULL REFERENCES calls(call_id),
//!     user_id TEXT NOT NULL,
//!     spoken_lang TEXT NOT NULL,
//!     dubbing_required BOOLEAN NOT NULL,
//!     voice_profile_ref TEXT,
//!     voice_clone_quality_score REAL,
//!     joined_at TIMESTAMPTZ NOT NULL,
//!     left_at TIMESTAMPTZ,
//!     PRIMARY KEY (call_id, user_id, joined_at)
//! );
//!
//! CREATE TABLE transcript_entries (
//!     call_id TEXT NOT NULL,
//!     speaker_id TEXT NOT NULL,
//!     original_lang TEXT NOT NULL,
//!     original_text TEXT NOT NULL,
//!     target_lang TEXT NOT NULL,
//!     translated_text TEXT NOT NULL,
//!     timestamp_ms BIGINT NOT NULL,
//!     tts_method TEXT NOT NULL
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use relay_core::{Call, CallStatus, Error, Language, Participant, TranscriptEntry, TtsMethod};

use crate::{CallStore, TranscriptStore};

pub struct PostgresCallStore {
    pool: PgPool,
}

impl PostgresCallStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_str(status: CallStatus) -> &'static str {
    match status {
        CallStatus::Initiating => "initiating",
        CallStatus::Ringing => "ringing",
        CallStatus::Ongoing => "ongoing",
        CallStatus::Ended => "ended",
        CallStatus::Missed => "missed",
    }
}

fn status_from_str(s: &str) -> CallStatus {
    match s {
        "initiating" => CallStatus::Initiating,
        "ringing" => CallStatus::Ringing,
        "ongoing" => CallStatus::Ongoing,
        "ended" => CallStatus::Ended,
        _ => CallStatus::Missed,
    }
}

#[async_trait]
impl CallStore for PostgresCallStore {
    async fn create_call(&self, call: Call) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO calls (call_id, call_language, status, created_at) VALUES ($1, $2, $3, $4)
             ON CONFLICT (call_id) DO NOTHING",
        )
        .bind(&call.call_id)
        .bind(call.call_language.code())
        .bind(status_str(call.status))
        .bind(call.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Transient(format!("insert call failed: {e}")))?;
        Ok(())
    }

    async fn get_call(&self, call_id: &str) -> Result<Option<Call>, Error> {
        let row: Option<(String, String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT call_id, call_language, status, created_at FROM calls WHERE call_id = $1",
        )
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Transient(format!("select call failed: {e}")))?;

        Ok(row.map(|(call_id, lang, status, created_at)| Call {
            call_id,
            call_language: Language::from(lang.as_str()),
            status: status_from_str(&status),
            created_at,
        }))
    }

    async fn end_call(&self, call_id: &str) -> Result<(), Error> {
        sqlx::query("UPDATE calls SET status = 'ended' WHERE call_id = $1")
            .bind(call_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Transient(format!("update call failed: {e}")))?;
        Ok(())
    }

    async fn join(&self, participant: Participant) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO participants
                (call_id, user_id, spoken_lang, dubbing_required, voice_profile_ref, voice_clone_quality_score, joined_at, left_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&participant.call_id)
        .bind(&participant.user_id)
        .bind(participant.spoken_lang.code())
        .bind(participant.dubbing_required)
        .bind(&participant.voice_profile_ref)
        .bind(participant.voice_clone_quality_score)
        .bind(participant.joined_at)
        .bind(participant.left_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Transient(format!("insert participant failed: {e}")))?;
        Ok(())
    }

    async fn leave(&self, call_id: &str, user_id: &str) -> Result<(), Error> {
        sqlx::query(
            "UPDATE participants SET left_at = now()
             WHERE call_id = $1 AND user_id = $2 AND left_at IS NULL",
        )
        .bind(call_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Transient(format!("update participant failed: {e}")))?;
        Ok(())
    }

    async fn set_muted(&self, _call_id: &str, _user_id: &str, _muted: bool) -> Result<(), Error> {
        // Mute is session-scoped, held by the Session Orchestrator, not
        // persisted call-state (spec §3 `Session.muted`).
        Ok(())
    }

    async fn active_participants(&self, call_id: &str) -> Result<Vec<Participant>, Error> {
        let rows: Vec<(
            String,
            String,
            String,
            bool,
            Option<String>,
            Option<f32>,
            DateTime<Utc>,
            Option<DateTime<Utc>>,
        )> = sqlx::query_as(
            "SELECT call_id, user_id, spoken_lang, dubbing_required, voice_profile_ref, voice_clone_quality_score, joined_at, left_at
             FROM participants WHERE call_id = $1 AND left_at IS NULL",
        )
        .bind(call_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Transient(format!("select participants failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(
                |(call_id, user_id, spoken_lang, dubbing_required, voice_profile_ref, voice_clone_quality_score, joined_at, left_at)| {
                    Participant {
                        call_id,
                        user_id,
                        spoken_lang: Language::from(spoken_lang.as_str()),
                        dubbing_required,
                        voice_profile_ref,
                        voice_clone_quality_score,
                        joined_at,
                        left_at,
                    }
                },
            )
            .collect())
    }
}

pub struct PostgresTranscriptStore {
    pool: PgPool,
}

impl PostgresTranscriptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn tts_method_str(m: TtsMethod) -> &'static str {
    match m {
        TtsMethod::Synthesized => "synthesized",
        TtsMethod::CacheHit => "cache_hit",
        TtsMethod::Passthrough => "passthrough",
        TtsMethod::Skipped => "skipped",
    }
}

fn tts_method_from_str(s: &str) -> TtsMethod {
    match s {
        "cache_hit" => TtsMethod::CacheHit,
        "passthrough" => TtsMethod::Passthrough,
        "skipped" => TtsMethod::Skipped,
        _ => TtsMethod::Synthesized,
    }
}

#[async_trait]
impl TranscriptStore for PostgresTranscriptStore {
    async fn append(&self, entry: TranscriptEntry) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO transcript_entries
                (call_id, speaker_id, original_lang, original_text, target_lang, translated_text, timestamp_ms, tts_method)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&entry.call_id)
        .bind(&entry.speaker_id)
        .bind(entry.original_lang.code())
        .bind(&entry.original_text)
        .bind(entry.target_lang.code())
        .bind(&entry.translated_text)
        .bind(entry.timestamp_ms as i64)
        .bind(tts_method_str(entry.tts_method))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Transient(format!("insert transcript entry failed: {e}")))?;
        Ok(())
    }

    async fn for_call(&self, call_id: &str) -> Result<Vec<TranscriptEntry>, Error> {
        let rows: Vec<(String, String, String, String, String, String, i64, String)> = sqlx::query_as(
            "SELECT call_id, speaker_id, original_lang, original_text, target_lang, translated_text, timestamp_ms, tts_method
             FROM transcript_entries WHERE call_id = $1 ORDER BY timestamp_ms ASC",
        )
        .bind(call_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Transient(format!("select transcript entries failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(
                |(call_id, speaker_id, original_lang, original_text, target_lang, translated_text, timestamp_ms, tts_method)| {
                    TranscriptEntry {
                        call_id,
                        speaker_id,
                        original_lang: Language::from(original_lang.as_str()),
                        original_text,
                        target_lang: Language::from(target_lang.as_str()),
                        translated_text,
                        timestamp_ms: timestamp_ms as u64,
                        tts_method: tts_method_from_str(&tts_method),
                    }
                },
            )
            .collect())
    }
}
