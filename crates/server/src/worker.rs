//! Per-call ingest worker: one task per active call, draining its Ingest
//! Stream, feeding each speaker's frames through a dedicated `Chunker`,
//! and handing finished utterances to the Translation Processor. Keeping
//! this off the WebSocket read loop means a slow recognize/translate/
//! synthesize fan-out for one utterance never backs up frame ingestion
//! for the call.

use std::collections::HashMap;
use std::time::Duration;

use relay_pipeline::Chunker;
use tokio::sync::mpsc;

use crate::state::AppState;

const MAX_RECORDS_PER_POLL: usize = 32;
const EMPTY_POLL_BACKOFF: Duration = Duration::from_millis(20);
/// Stop polling a call once no Session has been attached to it for this
/// many consecutive empty-session checks, rather than running forever
/// after every participant has left.
const IDLE_POLLS_BEFORE_SHUTDOWN: u32 = 50;

/// Number of dropped records implied by two consecutive `seq` values from
/// the same speaker. Zero for in-order or out-of-order-but-not-missing
/// deliveries; never negative (a lower `seq` than last seen isn't treated
/// as a gap — it's either a duplicate or a reordered redelivery).
fn sequence_gap(prev: u64, current: u64) -> u64 {
    current.saturating_sub(prev).saturating_sub(1)
}

/// Start the worker for `call_id` if one isn't already running. Safe to
/// call on every join — `AppState.active_calls` deduplicates.
pub fn ensure_worker(state: AppState, call_id: String) {
    if !state.active_calls.insert(call_id.clone()) {
        return;
    }
    tracing::info!(call_id = %call_id, "starting ingest worker");
    tokio::spawn(run_worker(state, call_id));
}

/// One task per speaker drains this queue and awaits `process` to
/// completion before dequeuing the next utterance, so a speaker's
/// TranslationResults publish in spoken order even though recognize/
/// translate/synthesize latency varies per utterance (spec §5 "publication
/// for utterances of the same speaker is serialized").
fn spawn_speaker_processor(state: &AppState) -> mpsc::UnboundedSender<relay_core::Utterance> {
    let (tx, mut rx) = mpsc::unbounded_channel::<relay_core::Utterance>();
    let state = state.clone();
    tokio::spawn(async move {
        while let Some(utterance) = rx.recv().await {
            let call_id = utterance.call_id.clone();
            if let Err(e) = state.processor.process(utterance).await {
                tracing::warn!(call_id = %call_id, error = %e, "utterance processing failed");
            }
        }
    });
    tx
}

async fn run_worker(state: AppState, call_id: String) {
    let consumer_group = state.config.read().transport.consumer_group.clone();
    let pipeline_config = state.config.read().pipeline;

    let mut chunkers: HashMap<String, Chunker> = HashMap::new();
    let mut speaker_queues: HashMap<String, mpsc::UnboundedSender<relay_core::Utterance>> = HashMap::new();
    let mut idle_polls: u32 = 0;
    // Last `IngestRecord::seq` observed per speaker, for gap detection
    // only; a gap is recorded and otherwise ignored rather than used to
    // reset or corrupt the Chunker's segmentation state (spec §3).
    let mut last_seq: HashMap<String, u64> = HashMap::new();

    loop {
        if state.sessions.sessions_for_call(&call_id).is_empty() {
            idle_polls += 1;
            if idle_polls >= IDLE_POLLS_BEFORE_SHUTDOWN {
                break;
            }
        } else {
            idle_polls = 0;
        }

        match state.ingest.reclaim_expired(&call_id).await {
            Ok(0) => {}
            Ok(n) => tracing::debug!(call_id = %call_id, reclaimed = n, "reclaimed expired ingest records"),
            Err(e) => tracing::warn!(call_id = %call_id, error = %e, "reclaim_expired failed"),
        }

        let records = match state.ingest.consume(&call_id, &consumer_group, MAX_RECORDS_PER_POLL).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(call_id = %call_id, error = %e, "ingest consume failed");
                tokio::time::sleep(EMPTY_POLL_BACKOFF).await;
                continue;
            }
        };

        if records.is_empty() {
            tokio::time::sleep(EMPTY_POLL_BACKOFF).await;
            continue;
        }

        for delivered in records {
            let speaker_id = delivered.record.speaker_id.clone();

            if let Some(&prev) = last_seq.get(&speaker_id) {
                let gap = sequence_gap(prev, delivered.record.seq);
                if gap > 0 {
                    tracing::warn!(call_id = %call_id, speaker_id = %speaker_id, gap, "ingest sequence gap detected");
                    metrics::counter!("ingest_sequence_gaps_total", "call_id" => call_id.clone()).increment(gap);
                }
            }
            last_seq.insert(speaker_id.clone(), delivered.record.seq);

            let chunker = chunkers.entry(speaker_id.clone()).or_insert_with(|| {
                Chunker::new(call_id.clone(), speaker_id, delivered.record.source_lang.clone(), pipeline_config)
            });

            let output = chunker.feed(delivered.record.pcm, delivered.record.frame_ts_ms);

            if let Err(e) = state.ingest.ack(&call_id, &delivered.ack_id).await {
                tracing::warn!(call_id = %call_id, error = %e, "ack failed");
            }

            if let Some(utterance) = output.utterance {
                let queue = speaker_queues
                    .entry(speaker_id)
                    .or_insert_with(|| spawn_speaker_processor(&state));
                let _ = queue.send(utterance);
            }
        }
    }

    for chunker in chunkers.values_mut() {
        if let Some(utterance) = chunker.flush() {
            let queue = speaker_queues
                .entry(utterance.speaker_id.clone())
                .or_insert_with(|| spawn_speaker_processor(&state));
            let _ = queue.send(utterance);
        }
    }

    state.active_calls.remove(&call_id);
    tracing::info!(call_id = %call_id, "ingest worker stopped");
}
