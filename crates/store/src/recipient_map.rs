//! Recipient-Map (spec §4.6): for a given call, groups active
//! participants by target language so the Translation Processor knows
//! which languages to produce and who should receive each one.
//!
//! Wraps a `CallStore` with a short-TTL cache, invalidated immediately on
//! join/leave/mute rather than waiting out the TTL — the cache exists to
//! absorb repeated lookups within one utterance's fan-out, not to survive
//! membership changes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use relay_core::{Error, RecipientTargets};

use crate::CallStore;

struct CacheEntry {
    targets: RecipientTargets,
    computed_at: Instant,
}

pub struct RecipientMap {
    store: Arc<dyn CallStore>,
    ttl: Duration,
    cache: DashMap<String, CacheEntry>,
}

impl RecipientMap {
    pub fn new(store: Arc<dyn CallStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            cache: DashMap::new(),
        }
    }

    /// Target-language -> recipient user ids for every active participant
    /// of `call_id`. The speaker is excluded unless `include_speaker` is
    /// set — a speaker doesn't receive their own translation back by
    /// default (spec §9 Open Questions).
    pub async fn recipients_for(
        &self,
        call_id: &str,
        speaker_id: &str,
        include_speaker: bool,
    ) -> Result<RecipientTargets, Error> {
        if let Some(entry) = self.cache.get(call_id) {
            if entry.computed_at.elapsed() < self.ttl {
                return Ok(apply_speaker_policy(&entry.targets, speaker_id, include_speaker));
            }
        }

        let targets = self.compute(call_id).await?;
        self.cache.insert(
            call_id.to_string(),
            CacheEntry {
                targets: targets.clone(),
                computed_at: Instant::now(),
            },
        );
        Ok(apply_speaker_policy(&targets, speaker_id, include_speaker))
    }

    async fn compute(&self, call_id: &str) -> Result<RecipientTargets, Error> {
        let participants = self.store.active_participants(call_id).await?;
        let mut targets = RecipientTargets::new();
        for p in participants {
            targets
                .entry(p.spoken_lang.code().to_string())
                .or_default()
                .push(p.user_id);
        }
        Ok(targets)
    }

    /// Drop the cached entry for a call immediately, so the next lookup
    /// reflects a just-applied join/leave/mute (spec §4.6 "invalidation").
    pub fn invalidate(&self, call_id: &str) {
        self.cache.remove(call_id);
    }
}

fn apply_speaker_policy(
    targets: &RecipientTargets,
    speaker_id: &str,
    include_speaker: bool,
) -> RecipientTargets {
    if include_speaker {
        return targets.clone();
    }
    targets
        .iter()
        .filter_map(|(lang, ids)| {
            let filtered: Vec<String> = ids.iter().filter(|id| id.as_str() != speaker_id).cloned().collect();
            if filtered.is_empty() {
                None
            } else {
                Some((lang.clone(), filtered))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryCallStore;
    use chrono::Utc;
    use relay_core::{Language, Participant};

    fn participant(call_id: &str, user_id: &str, lang: &str) -> Participant {
        Participant {
            call_id: call_id.to_string(),
            user_id: user_id.to_string(),
            spoken_lang: Language::from(lang),
            dubbing_required: false,
            voice_profile_ref: None,
            voice_clone_quality_score: None,
            joined_at: Utc::now(),
            left_at: None,
        }
    }

    #[tokio::test]
    async fn groups_participants_by_language_excluding_speaker() {
        let store: Arc<dyn CallStore> = Arc::new(InMemoryCallStore::new());
        store.join(participant("call-1", "u1", "en")).await.unwrap();
        store.join(participant("call-1", "u2", "he")).await.unwrap();
        store.join(participant("call-1", "u3", "he")).await.unwrap();

        let map = RecipientMap::new(store, Duration::from_secs(2));
        let targets = map.recipients_for("call-1", "u1", false).await.unwrap();

        assert_eq!(targets.get("en-US"), None);
        let he_recipients = targets.get("he-IL").unwrap();
        assert_eq!(he_recipients.len(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_recompute() {
        let store: Arc<dyn CallStore> = Arc::new(InMemoryCallStore::new());
        store.join(participant("call-1", "u1", "en")).await.unwrap();

        let map = RecipientMap::new(store.clone(), Duration::from_secs(60));
        let before = map.recipients_for("call-1", "nobody", false).await.unwrap();
        assert_eq!(before.get("en-US").unwrap().len(), 1);

        store.join(participant("call-1", "u2", "en")).await.unwrap();
        map.invalidate("call-1");

        let after = map.recipients_for("call-1", "nobody", false).await.unwrap();
        assert_eq!(after.get("en-US").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn include_speaker_keeps_speaker_in_their_own_language_group() {
        let store: Arc<dyn CallStore> = Arc::new(InMemoryCallStore::new());
        store.join(participant("call-1", "u1", "en")).await.unwrap();
        store.join(participant("call-1", "u2", "en")).await.unwrap();

        let map = RecipientMap::new(store, Duration::from_secs(2));
        let targets = map.recipients_for("call-1", "u1", true).await.unwrap();

        assert_eq!(targets.get("en-US").unwrap().len(), 2);
    }
}
