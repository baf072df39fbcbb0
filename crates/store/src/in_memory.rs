//! In-memory call-state and transcript stores. No persistence across
//! restarts; sufficient for tests and a single-process deployment.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;

use relay_core::{Call, Error, Participant, TranscriptEntry};

use crate::{CallStore, TranscriptStore};

#[derive(Default)]
pub struct InMemoryCallStore {
    calls: DashMap<String, Call>,
    // (call_id, user_id) -> Participant
    participants: DashMap<(String, String), Participant>,
}

impl InMemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CallStore for InMemoryCallStore {
    async fn create_call(&self, call: Call) -> Result<(), Error> {
        self.calls.insert(call.call_id.clone(), call);
        Ok(())
    }

    async fn get_call(&self, call_id: &str) -> Result<Option<Call>, Error> {
        Ok(self.calls.get(call_id).map(|c| c.clone()))
    }

    async fn end_call(&self, call_id: &str) -> Result<(), Error> {
        if let Some(mut call) = self.calls.get_mut(call_id) {
            call.status = relay_core::CallStatus::Ended;
        }
        Ok(())
    }

    async fn join(&self, participant: Participant) -> Result<(), Error> {
        let key = (participant.call_id.clone(), participant.user_id.clone());
        self.participants.insert(key, participant);
        Ok(())
    }

    async fn leave(&self, call_id: &str, user_id: &str) -> Result<(), Error> {
        if let Some(mut p) = self
            .participants
            .get_mut(&(call_id.to_string(), user_id.to_string()))
        {
            p.left_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn set_muted(&self, _call_id: &str, _user_id: &str, _muted: bool) -> Result<(), Error> {
        // Mute is session-level (spec §3 `Session.muted`), not participant
        // state; tracked by the Session Orchestrator, not this store.
        Ok(())
    }

    async fn active_participants(&self, call_id: &str) -> Result<Vec<Participant>, Error> {
        Ok(self
            .participants
            .iter()
            .filter(|entry| entry.key().0 == call_id && entry.value().is_active())
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryTranscriptStore {
    entries: RwLock<HashMap<String, Vec<TranscriptEntry>>>,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    async fn append(&self, entry: TranscriptEntry) -> Result<(), Error> {
        self.entries
            .write()
            .entry(entry.call_id.clone())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn for_call(&self, call_id: &str) -> Result<Vec<TranscriptEntry>, Error> {
        Ok(self
            .entries
            .read()
            .get(call_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{CallStatus, Language};

    fn call(id: &str) -> Call {
        Call {
            call_id: id.to_string(),
            call_language: Language::from("en"),
            status: CallStatus::Ongoing,
            created_at: Utc::now(),
        }
    }

    fn participant(call_id: &str, user_id: &str) -> Participant {
        Participant {
            call_id: call_id.to_string(),
            user_id: user_id.to_string(),
            spoken_lang: Language::from("en"),
            dubbing_required: false,
            voice_profile_ref: None,
            voice_clone_quality_score: None,
            joined_at: Utc::now(),
            left_at: None,
        }
    }

    #[tokio::test]
    async fn join_then_active_participants_reflects_it() {
        let store = InMemoryCallStore::new();
        store.create_call(call("call-1")).await.unwrap();
        store.join(participant("call-1", "u1")).await.unwrap();

        let active = store.active_participants("call-1").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].user_id, "u1");
    }

    #[tokio::test]
    async fn leave_removes_from_active_participants() {
        let store = InMemoryCallStore::new();
        store.join(participant("call-1", "u1")).await.unwrap();
        store.leave("call-1", "u1").await.unwrap();

        let active = store.active_participants("call-1").await.unwrap();
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn transcript_store_appends_in_order() {
        let store = InMemoryTranscriptStore::new();
        for i in 0..3 {
            store
                .append(TranscriptEntry {
                    call_id: "call-1".into(),
                    speaker_id: "u1".into(),
                    original_lang: Language::from("en"),
                    original_text: format!("line {i}"),
                    target_lang: Language::from("he"),
                    translated_text: format!("line {i} he"),
                    timestamp_ms: i,
                    tts_method: relay_core::TtsMethod::Synthesized,
                })
                .await
                .unwrap();
        }

        let entries = store.for_call("call-1").await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].original_text, "line 2");
    }
}
