//! Bounded, sharded TTS audio cache (spec §4.4).
//!
//! Keyed by `(text, target_lang, voice_profile_ref or "default")`, text
//! normalized by trimming and lowercasing so "Hello" and "hello " hit the
//! same entry. Sharded so concurrent utterances for different callers
//! don't serialize on one lock; each shard enforces its share of the
//! configured entry-count and byte-size budgets independently, which
//! means the global byte ceiling is approximate rather than exact under
//! skewed shard load — acceptable here since the cache is a latency
//! optimization, not a correctness boundary.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use relay_config::TtsCacheConfig;
use relay_core::{Language, VoiceProfile};

#[derive(Clone)]
struct Entry {
    audio: std::sync::Arc<Vec<u8>>,
}

struct Shard {
    lru: Mutex<LruCache<String, Entry>>,
    bytes_used: AtomicUsize,
    byte_budget: usize,
}

pub struct TtsCache {
    shards: Vec<Shard>,
}

impl TtsCache {
    pub fn new(config: &TtsCacheConfig) -> Self {
        let shard_count = config.shard_count.max(1);
        let per_shard_entries = (config.tts_cache_entries / shard_count).max(1);
        let per_shard_bytes = config.tts_cache_bytes / shard_count;

        let shards = (0..shard_count)
            .map(|_| Shard {
                lru: Mutex::new(LruCache::new(
                    std::num::NonZeroUsize::new(per_shard_entries).unwrap(),
                )),
                bytes_used: AtomicUsize::new(0),
                byte_budget: per_shard_bytes,
            })
            .collect();

        Self { shards }
    }

    /// Build the normalized cache key for a (text, target_lang, voice)
    /// triple (spec §4.4 "cache key").
    pub fn cache_key(text: &str, target_lang: &Language, voice: &VoiceProfile) -> String {
        format!(
            "{}\u{1}{}\u{1}{}",
            text.trim().to_lowercase(),
            target_lang.code(),
            voice.cache_key_component()
        )
    }

    fn shard_for(&self, key: &str) -> &Shard {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    pub fn get(&self, key: &str) -> Option<std::sync::Arc<Vec<u8>>> {
        let shard = self.shard_for(key);
        let mut lru = shard.lru.lock();
        let hit = lru.get(key).map(|e| e.audio.clone());
        if hit.is_some() {
            metrics::counter!("tts_cache_hits_total").increment(1);
        } else {
            metrics::counter!("tts_cache_misses_total").increment(1);
        }
        hit
    }

    pub fn put(&self, key: String, audio: Vec<u8>) {
        let shard = self.shard_for(&key);
        let audio_len = audio.len();
        let entry = Entry {
            audio: std::sync::Arc::new(audio),
        };

        let mut lru = shard.lru.lock();

        // Evict oldest entries until the new one fits within the shard's
        // byte budget (spec §4.4 "byte-size limit").
        while shard.bytes_used.load(Ordering::Relaxed) + audio_len > shard.byte_budget {
            match lru.pop_lru() {
                Some((_, evicted)) => {
                    shard
                        .bytes_used
                        .fetch_sub(evicted.audio.len(), Ordering::Relaxed);
                }
                None => break,
            }
        }

        if let Some(replaced) = lru.put(key, entry) {
            shard
                .bytes_used
                .fetch_sub(replaced.audio.len(), Ordering::Relaxed);
        }
        shard.bytes_used.fetch_add(audio_len, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lru.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> TtsCacheConfig {
        TtsCacheConfig {
            tts_cache_entries: 4,
            tts_cache_bytes: 40,
            shard_count: 1,
        }
    }

    #[test]
    fn cache_key_normalizes_text_case_and_whitespace() {
        let en = Language::from("en");
        let voice = VoiceProfile::new(en.clone());
        let a = TtsCache::cache_key("Hello", &en, &voice);
        let b = TtsCache::cache_key(" hello ", &en, &voice);
        assert_eq!(a, b);
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = TtsCache::new(&small_config());
        let key = "k1".to_string();
        cache.put(key.clone(), vec![1, 2, 3]);
        assert_eq!(cache.get(&key).unwrap().as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn miss_returns_none() {
        let cache = TtsCache::new(&small_config());
        assert!(cache.get("nonexistent").is_none());
    }

    #[test]
    fn byte_budget_evicts_oldest_entries() {
        let cache = TtsCache::new(&small_config()); // 40 bytes budget
        cache.put("a".into(), vec![0u8; 20]);
        cache.put("b".into(), vec![0u8; 20]);
        // Inserting a third 20-byte entry must evict "a" (LRU) to fit.
        cache.put("c".into(), vec![0u8; 20]);

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn entry_count_budget_is_respected() {
        let config = TtsCacheConfig {
            tts_cache_entries: 2,
            tts_cache_bytes: 1_000_000,
            shard_count: 1,
        };
        let cache = TtsCache::new(&config);
        cache.put("a".into(), vec![0u8; 1]);
        cache.put("b".into(), vec![0u8; 1]);
        cache.put("c".into(), vec![0u8; 1]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
    }
}
