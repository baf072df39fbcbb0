//! Translation Processor (spec §4.5): one recognize call, then one
//! translate + one synthesize per target language, fanned out
//! concurrently with per-language failure isolation. Publication to the
//! Delivery Bus and persistence to the Transcript Store proceed
//! independently of each other once a language's result is ready.

pub mod clock;

use std::collections::HashMap;
use std::sync::Arc;

use relay_cache::TtsCache;
use relay_config::SpeechClientConfig;
use relay_core::{
    determine_dubbing_required, voice_clone_quality_from_score, Error, Participant,
    PerLanguageResult, SpeechToText, TextToSpeech, TranscriptEntry, Translator, TtsMethod,
    Utterance, VoiceCloneQuality, VoiceProfile,
};
use relay_pipeline::ContextStore;
use relay_store::{CallStore, RecipientMap, TranscriptStore};
use relay_transport::DeliveryBus;

pub use clock::MonotonicClock;

/// The voice profile id synthesis should actually use for a participant:
/// their configured clone when it scores high enough to trust, the
/// default voice otherwise (spec §4.4 cache key, spec §9
/// `voice_clone_quality_from_score`).
fn effective_voice_ref(participant: &Participant) -> Option<String> {
    match voice_clone_quality_from_score(participant) {
        VoiceCloneQuality::Usable => participant.voice_profile_ref.clone(),
        VoiceCloneQuality::Low | VoiceCloneQuality::Unavailable => None,
    }
}

pub struct TranslationProcessor {
    stt: Arc<dyn SpeechToText>,
    translator: Arc<dyn Translator>,
    tts: Arc<dyn TextToSpeech>,
    cache: Arc<TtsCache>,
    context: Arc<ContextStore>,
    recipients: Arc<RecipientMap>,
    call_store: Arc<dyn CallStore>,
    delivery: Arc<dyn DeliveryBus>,
    transcripts: Arc<dyn TranscriptStore>,
    clock: Arc<MonotonicClock>,
    min_recognition_confidence: f32,
    include_speaker: bool,
}

impl TranslationProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        translator: Arc<dyn Translator>,
        tts: Arc<dyn TextToSpeech>,
        cache: Arc<TtsCache>,
        context: Arc<ContextStore>,
        recipients: Arc<RecipientMap>,
        call_store: Arc<dyn CallStore>,
        delivery: Arc<dyn DeliveryBus>,
        transcripts: Arc<dyn TranscriptStore>,
        speech_config: &SpeechClientConfig,
        include_speaker: bool,
    ) -> Self {
        Self {
            stt,
            translator,
            tts,
            cache,
            context,
            recipients,
            call_store,
            delivery,
            transcripts,
            clock: Arc::new(MonotonicClock::new()),
            min_recognition_confidence: speech_config.min_recognition_confidence,
            include_speaker,
        }
    }

    /// Run the full recognize -> {translate, synthesize}* -> publish +
    /// persist pipeline for one utterance.
    pub async fn process(&self, utterance: Utterance) -> Result<(), Error> {
        let started_at = std::time::Instant::now();
        let recognition = self
            .stt
            .recognize(&utterance.pcm_bytes, &utterance.source_lang)
            .await?;

        if recognition.text.trim().is_empty() || recognition.confidence < self.min_recognition_confidence {
            tracing::debug!(
                call_id = %utterance.call_id,
                utterance_id = %utterance.utterance_id,
                confidence = recognition.confidence,
                "recognition below confidence threshold, recording no-op transcript entry"
            );
            self.transcripts
                .append(TranscriptEntry {
                    call_id: utterance.call_id.clone(),
                    speaker_id: utterance.speaker_id.clone(),
                    original_lang: utterance.source_lang.clone(),
                    original_text: recognition.text,
                    target_lang: utterance.source_lang.clone(),
                    translated_text: String::new(),
                    timestamp_ms: self.clock.next(&utterance.call_id),
                    tts_method: TtsMethod::Skipped,
                })
                .await?;
            metrics::counter!("utterances_below_confidence_threshold_total").increment(1);
            return Ok(());
        }

        let recipient_targets = self
            .recipients
            .recipients_for(&utterance.call_id, &utterance.speaker_id, self.include_speaker)
            .await?;

        let call = self.call_store.get_call(&utterance.call_id).await?;
        let active_participants = self
            .call_store
            .active_participants(&utterance.call_id)
            .await?;

        let dub_required_by_lang: HashMap<String, bool> = match &call {
            Some(call) => recipient_targets
                .keys()
                .map(|lang_code| {
                    let needs_dub = active_participants
                        .iter()
                        .filter(|p| p.spoken_lang.code() == lang_code)
                        .any(|p| determine_dubbing_required(p, call));
                    (lang_code.clone(), needs_dub)
                })
                .collect(),
            None => recipient_targets.keys().map(|k| (k.clone(), true)).collect(),
        };

        // Per-recipient voice override, so distinct cloned voices within
        // the same target language synthesize (and cache) separately
        // instead of always falling back to the default voice (spec §4.4).
        let voice_ref_by_recipient: Arc<HashMap<String, Option<String>>> = Arc::new(
            active_participants
                .iter()
                .map(|p| (p.user_id.clone(), effective_voice_ref(p)))
                .collect(),
        );

        let tasks = recipient_targets.into_iter().map(|(target_lang_code, recipient_ids)| {
            let target_lang = relay_core::Language::from(target_lang_code.as_str());
            let needs_dub = dub_required_by_lang.get(&target_lang_code).copied().unwrap_or(true);
            self.translate_and_synthesize(
                &utterance,
                &recognition.text,
                target_lang,
                recipient_ids,
                needs_dub,
                voice_ref_by_recipient.clone(),
            )
        });

        let outcomes: Vec<(PerLanguageResult, TtsMethod)> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter_map(|r| match r {
                Ok(outcome) => Some(outcome),
                Err((lang, e)) => {
                    tracing::warn!(call_id = %utterance.call_id, target_lang = %lang, error = %e, "language fan-out failed");
                    metrics::counter!("translation_language_failures_total").increment(1);
                    None
                }
            })
            .flatten()
            .collect();

        let timestamp_ms = self.clock.next(&utterance.call_id);

        let per_language: Vec<PerLanguageResult> = outcomes.iter().map(|(pl, _)| pl.clone()).collect();
        let tts_methods: Vec<TtsMethod> = outcomes.iter().map(|(_, m)| *m).collect();

        let result = relay_core::TranslationResult {
            utterance_id: utterance.utterance_id.clone(),
            call_id: utterance.call_id.clone(),
            speaker_id: utterance.speaker_id.clone(),
            original_text: recognition.text.clone(),
            source_lang: utterance.source_lang.clone(),
            per_language,
            timestamp_ms,
        };

        // Publish and persist independently: a transcript-store failure
        // must not block delivery, and vice versa (spec §4.5).
        let publish = self.delivery.publish(&utterance.call_id, result.clone());
        let persist = self.persist_transcript(&utterance, &result, &tts_methods);
        let (publish_res, persist_res) = tokio::join!(publish, persist);

        if let Err(e) = publish_res {
            tracing::warn!(call_id = %utterance.call_id, error = %e, "delivery bus publish failed");
        }
        if let Err(e) = persist_res {
            tracing::warn!(call_id = %utterance.call_id, error = %e, "transcript persistence failed");
        }

        metrics::counter!("utterances_emitted_total").increment(1);
        metrics::histogram!("utterance_pipeline_latency_ms").record(started_at.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }

    /// Translates once for `target_lang`, then synthesizes once per
    /// distinct effective voice profile among `recipient_ids` — most
    /// languages have a single group and thus a single synthesis call,
    /// but recipients with different configured clone voices split into
    /// separate `PerLanguageResult`s sharing the same translated text.
    async fn translate_and_synthesize(
        &self,
        utterance: &Utterance,
        original_text: &str,
        target_lang: relay_core::Language,
        recipient_ids: Vec<String>,
        needs_dub: bool,
        voice_ref_by_recipient: Arc<HashMap<String, Option<String>>>,
    ) -> Result<Vec<(PerLanguageResult, TtsMethod)>, (relay_core::Language, Error)> {
        let translated_text = if target_lang == utterance.source_lang {
            original_text.to_string()
        } else {
            let context = self.context.get(&utterance.call_id, &target_lang);
            self.translator
                .translate(
                    original_text,
                    &utterance.source_lang,
                    &target_lang,
                    context.as_deref(),
                )
                .await
                .map_err(|e| (target_lang.clone(), e))?
        };
        self.context
            .record(&utterance.call_id, &target_lang, &translated_text);

        if !needs_dub {
            return Ok(vec![(
                PerLanguageResult {
                    target_lang,
                    text: translated_text,
                    audio_bytes: None,
                    recipient_ids,
                },
                TtsMethod::Skipped,
            )]);
        }

        let mut by_voice: HashMap<Option<String>, Vec<String>> = HashMap::new();
        for recipient_id in recipient_ids {
            let voice_ref = voice_ref_by_recipient.get(&recipient_id).cloned().flatten();
            by_voice.entry(voice_ref).or_default().push(recipient_id);
        }

        let mut results = Vec::with_capacity(by_voice.len());
        for (voice_ref, ids) in by_voice {
            let (audio_bytes, tts_method) = self
                .synthesize_with_cache(&translated_text, &target_lang, voice_ref.as_deref())
                .await
                .map_err(|e| (target_lang.clone(), e))?;
            results.push((
                PerLanguageResult {
                    target_lang: target_lang.clone(),
                    text: translated_text.clone(),
                    audio_bytes,
                    recipient_ids: ids,
                },
                tts_method,
            ));
        }
        Ok(results)
    }

    async fn synthesize_with_cache(
        &self,
        text: &str,
        target_lang: &relay_core::Language,
        voice_ref: Option<&str>,
    ) -> Result<(Option<Vec<u8>>, TtsMethod), Error> {
        let voice = match voice_ref {
            Some(id) => VoiceProfile::new(target_lang.clone()).with_voice_id(id),
            None => VoiceProfile::new(target_lang.clone()),
        };
        let key = TtsCache::cache_key(text, target_lang, &voice);

        if let Some(cached) = self.cache.get(&key) {
            return Ok((Some((*cached).clone()), TtsMethod::CacheHit));
        }

        let pcm = self.tts.synthesize(text, &voice).await?;
        let bytes = pcm.into_vec();
        self.cache.put(key, bytes.clone());
        Ok((Some(bytes), TtsMethod::Synthesized))
    }

    async fn persist_transcript(
        &self,
        utterance: &Utterance,
        result: &relay_core::TranslationResult,
        tts_methods: &[TtsMethod],
    ) -> Result<(), Error> {
        for (pl, tts_method) in result.per_language.iter().zip(tts_methods.iter()) {
            self.transcripts
                .append(TranscriptEntry {
                    call_id: utterance.call_id.clone(),
                    speaker_id: utterance.speaker_id.clone(),
                    original_lang: utterance.source_lang.clone(),
                    original_text: result.original_text.clone(),
                    target_lang: pl.target_lang.clone(),
                    translated_text: pl.text.clone(),
                    timestamp_ms: result.timestamp_ms,
                    tts_method: *tts_method,
                })
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_cache::TtsCache;
    use relay_config::TtsCacheConfig;
    use relay_core::{Language, PcmBytes, Recognition, VoiceInfo};
    use relay_pipeline::ContextStore;
    use relay_store::{InMemoryCallStore, InMemoryTranscriptStore, RecipientMap};
    use relay_transport::InMemoryDeliveryBus;
    use std::time::Duration;

    struct FixedStt {
        text: &'static str,
        confidence: f32,
    }

    #[async_trait]
    impl SpeechToText for FixedStt {
        async fn recognize(&self, _pcm: &PcmBytes, _source_lang: &Language) -> Result<Recognition, Error> {
            Ok(Recognition {
                text: self.text.to_string(),
                confidence: self.confidence,
            })
        }

        fn model_name(&self) -> &str {
            "fixed-stt"
        }
    }

    struct CountingTranslator {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl CountingTranslator {
        fn new() -> Self {
            Self {
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Translator for CountingTranslator {
        async fn translate(
            &self,
            text: &str,
            _source_lang: &Language,
            target_lang: &Language,
            _context: Option<&str>,
        ) -> Result<String, Error> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(format!("{text}->{target_lang}"))
        }
    }

    struct CountingTts {
        calls: std::sync::atomic::AtomicUsize,
        voices: Vec<VoiceInfo>,
    }

    impl CountingTts {
        fn new() -> Self {
            Self {
                calls: std::sync::atomic::AtomicUsize::new(0),
                voices: Vec::new(),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextToSpeech for CountingTts {
        async fn synthesize(&self, _text: &str, _voice: &VoiceProfile) -> Result<PcmBytes, Error> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(PcmBytes::new(vec![0u8; 4]))
        }

        fn available_voices(&self) -> &[VoiceInfo] {
            &self.voices
        }
    }

    fn utterance(call_id: &str, speaker_id: &str, source_lang: &str) -> Utterance {
        Utterance {
            utterance_id: uuid::Uuid::new_v4().to_string(),
            call_id: call_id.to_string(),
            speaker_id: speaker_id.to_string(),
            source_lang: Language::from(source_lang),
            pcm_bytes: PcmBytes::new(vec![0u8; 4]),
            start_ts_ms: 0,
            end_ts_ms: 300,
        }
    }

    async fn seed_call(store: &InMemoryCallStore, call_id: &str, call_lang: &str, participants: &[(&str, &str)]) {
        seed_call_with_voices(store, call_id, call_lang, participants, &[]).await
    }

    /// Like `seed_call`, but `voices` additionally assigns
    /// `(user_id, voice_profile_ref, quality_score)` for specific
    /// participants so tests can exercise per-recipient voice selection.
    async fn seed_call_with_voices(
        store: &InMemoryCallStore,
        call_id: &str,
        call_lang: &str,
        participants: &[(&str, &str)],
        voices: &[(&str, &str, f32)],
    ) {
        store
            .create_call(relay_core::Call {
                call_id: call_id.to_string(),
                call_language: Language::from(call_lang),
                status: relay_core::CallStatus::Ongoing,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        for (user_id, spoken_lang) in participants {
            let voice = voices.iter().find(|(uid, _, _)| uid == user_id);
            store
                .join(relay_core::Participant {
                    call_id: call_id.to_string(),
                    user_id: user_id.to_string(),
                    spoken_lang: Language::from(*spoken_lang),
                    dubbing_required: true,
                    voice_profile_ref: voice.map(|(_, voice_ref, _)| voice_ref.to_string()),
                    voice_clone_quality_score: voice.map(|(_, _, score)| *score),
                    joined_at: chrono::Utc::now(),
                    left_at: None,
                })
                .await
                .unwrap();
        }
    }

    fn processor(
        stt: Arc<dyn SpeechToText>,
        translator: Arc<CountingTranslator>,
        tts: Arc<CountingTts>,
        call_store: Arc<InMemoryCallStore>,
        delivery: Arc<InMemoryDeliveryBus>,
        transcripts: Arc<InMemoryTranscriptStore>,
    ) -> TranslationProcessor {
        TranslationProcessor::new(
            stt,
            translator,
            tts,
            Arc::new(TtsCache::new(&TtsCacheConfig::default())),
            Arc::new(ContextStore::new(150)),
            Arc::new(RecipientMap::new(call_store.clone(), Duration::from_secs(5))),
            call_store,
            delivery,
            transcripts,
            &relay_config::SpeechClientConfig::default(),
            false,
        )
    }

    #[tokio::test]
    async fn three_party_fan_out_recognizes_once_and_translates_per_distinct_language() {
        let call_store = Arc::new(InMemoryCallStore::new());
        seed_call(
            &call_store,
            "call-1",
            "ru",
            &[("speaker-a", "ru"), ("user-b", "en"), ("user-c", "he")],
        )
        .await;

        let translator = Arc::new(CountingTranslator::new());
        let tts = Arc::new(CountingTts::new());
        let delivery = Arc::new(InMemoryDeliveryBus::new(16));
        let transcripts = Arc::new(InMemoryTranscriptStore::new());

        let mut rx = delivery.subscribe("call-1").await.unwrap();

        let proc = processor(
            Arc::new(FixedStt { text: "Privet, kak dela?", confidence: 0.95 }),
            translator.clone(),
            tts.clone(),
            call_store,
            delivery,
            transcripts.clone(),
        );

        proc.process(utterance("call-1", "speaker-a", "ru")).await.unwrap();

        // en and he each get exactly one translate and one synthesize call.
        assert_eq!(translator.call_count(), 2);
        assert_eq!(tts.call_count(), 2);

        let result = rx.recv().await.unwrap();
        assert_eq!(result.per_language.len(), 2);
        let langs: Vec<String> = result.per_language.iter().map(|pl| pl.target_lang.code().to_string()).collect();
        assert!(langs.contains(&"en-US".to_string()));
        assert!(langs.contains(&"he-IL".to_string()));
    }

    #[tokio::test]
    async fn cache_hit_skips_second_synthesize_call() {
        let call_store = Arc::new(InMemoryCallStore::new());
        seed_call(&call_store, "call-1", "en", &[("speaker-a", "en"), ("user-b", "he")]).await;

        let translator = Arc::new(CountingTranslator::new());
        let tts = Arc::new(CountingTts::new());
        let delivery = Arc::new(InMemoryDeliveryBus::new(16));
        let transcripts = Arc::new(InMemoryTranscriptStore::new());
        let _rx = delivery.subscribe("call-1").await.unwrap();

        let proc = processor(
            Arc::new(FixedStt { text: "Hello", confidence: 0.95 }),
            translator,
            tts.clone(),
            call_store,
            delivery,
            transcripts,
        );

        proc.process(utterance("call-1", "speaker-a", "en")).await.unwrap();
        proc.process(utterance("call-1", "speaker-a", "en")).await.unwrap();

        // Same source text, same target language both times: the second
        // utterance's synthesis is served from the TTS Cache.
        assert_eq!(tts.call_count(), 1);
    }

    #[tokio::test]
    async fn recognition_below_confidence_emits_no_translation_result() {
        let call_store = Arc::new(InMemoryCallStore::new());
        seed_call(&call_store, "call-1", "en", &[("speaker-a", "en"), ("user-b", "he")]).await;

        let translator = Arc::new(CountingTranslator::new());
        let tts = Arc::new(CountingTts::new());
        let delivery = Arc::new(InMemoryDeliveryBus::new(16));
        let transcripts = Arc::new(InMemoryTranscriptStore::new());

        let proc = processor(
            Arc::new(FixedStt { text: "mumble", confidence: 0.1 }),
            translator.clone(),
            tts.clone(),
            call_store,
            delivery,
            transcripts.clone(),
        );

        proc.process(utterance("call-1", "speaker-a", "en")).await.unwrap();

        assert_eq!(translator.call_count(), 0);
        assert_eq!(tts.call_count(), 0);
        let entries = transcripts.for_call("call-1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tts_method, TtsMethod::Skipped);
    }

    #[tokio::test]
    async fn recipients_with_distinct_usable_clone_voices_synthesize_separately() {
        let call_store = Arc::new(InMemoryCallStore::new());
        seed_call_with_voices(
            &call_store,
            "call-1",
            "en",
            &[("speaker-a", "en"), ("user-b", "he"), ("user-c", "he")],
            &[("user-b", "clone-b", 0.9), ("user-c", "clone-c", 0.95)],
        )
        .await;

        let translator = Arc::new(CountingTranslator::new());
        let tts = Arc::new(CountingTts::new());
        let delivery = Arc::new(InMemoryDeliveryBus::new(16));
        let transcripts = Arc::new(InMemoryTranscriptStore::new());
        let mut rx = delivery.subscribe("call-1").await.unwrap();

        let proc = processor(
            Arc::new(FixedStt { text: "Hello", confidence: 0.95 }),
            translator.clone(),
            tts.clone(),
            call_store,
            delivery,
            transcripts,
        );

        proc.process(utterance("call-1", "speaker-a", "en")).await.unwrap();

        // One translate call for "he" (shared across both recipients),
        // but two synthesize calls — one per distinct usable clone voice.
        assert_eq!(translator.call_count(), 1);
        assert_eq!(tts.call_count(), 2);

        let result = rx.recv().await.unwrap();
        assert_eq!(result.per_language.len(), 2);
        let mut recipient_ids: Vec<String> =
            result.per_language.iter().flat_map(|pl| pl.recipient_ids.clone()).collect();
        recipient_ids.sort();
        assert_eq!(recipient_ids, vec!["user-b".to_string(), "user-c".to_string()]);
    }

    #[tokio::test]
    async fn low_quality_clone_falls_back_to_shared_default_voice() {
        let call_store = Arc::new(InMemoryCallStore::new());
        seed_call_with_voices(
            &call_store,
            "call-1",
            "en",
            &[("speaker-a", "en"), ("user-b", "he"), ("user-c", "he")],
            &[("user-b", "clone-b", 0.2)],
        )
        .await;

        let translator = Arc::new(CountingTranslator::new());
        let tts = Arc::new(CountingTts::new());
        let delivery = Arc::new(InMemoryDeliveryBus::new(16));
        let transcripts = Arc::new(InMemoryTranscriptStore::new());
        let _rx = delivery.subscribe("call-1").await.unwrap();

        let proc = processor(
            Arc::new(FixedStt { text: "Hello", confidence: 0.95 }),
            translator,
            tts.clone(),
            call_store,
            delivery,
            transcripts,
        );

        proc.process(utterance("call-1", "speaker-a", "en")).await.unwrap();

        // user-b's clone score is below the usable threshold, so both
        // recipients fall back to the default voice and share one
        // synthesis call.
        assert_eq!(tts.call_count(), 1);
    }

    #[tokio::test]
    async fn same_language_recipient_gets_passthrough_text_without_synthesis() {
        let call_store = Arc::new(InMemoryCallStore::new());
        seed_call(&call_store, "call-1", "en", &[("speaker-a", "en"), ("user-b", "en")]).await;

        let translator = Arc::new(CountingTranslator::new());
        let tts = Arc::new(CountingTts::new());
        let delivery = Arc::new(InMemoryDeliveryBus::new(16));
        let transcripts = Arc::new(InMemoryTranscriptStore::new());
        let mut rx = delivery.subscribe("call-1").await.unwrap();

        let proc = processor(
            Arc::new(FixedStt { text: "Hello", confidence: 0.95 }),
            translator.clone(),
            tts.clone(),
            call_store,
            delivery,
            transcripts,
        );

        proc.process(utterance("call-1", "speaker-a", "en")).await.unwrap();

        assert_eq!(translator.call_count(), 0);
        let result = rx.recv().await.unwrap();
        assert_eq!(result.per_language[0].text, "Hello");
        assert!(result.per_language[0].audio_bytes.is_none());
    }
}
