//! Single-process Ingest Stream / Delivery Bus backends. Full semantics,
//! no persistence across restarts — suitable for tests and local runs
//! (spec §4.7, §4.8 "InMemory" backend).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use relay_core::{Error, TranslationResult};

use crate::{DeliveredRecord, DeliveryBus, IngestRecord, IngestStream};

struct InFlight {
    record: IngestRecord,
    claimed_at: Instant,
}

struct CallQueue {
    pending: Mutex<VecDeque<IngestRecord>>,
    in_flight: DashMap<String, InFlight>,
}

impl CallQueue {
    fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            in_flight: DashMap::new(),
        }
    }
}

pub struct InMemoryIngestStream {
    queues: DashMap<String, Arc<CallQueue>>,
    backpressure_max: usize,
    visibility_timeout: Duration,
}

impl InMemoryIngestStream {
    pub fn new(backpressure_max: usize, visibility_timeout: Duration) -> Self {
        Self {
            queues: DashMap::new(),
            backpressure_max,
            visibility_timeout,
        }
    }

    fn queue_for(&self, call_id: &str) -> Arc<CallQueue> {
        self.queues
            .entry(call_id.to_string())
            .or_insert_with(|| Arc::new(CallQueue::new()))
            .clone()
    }
}

#[async_trait]
impl IngestStream for InMemoryIngestStream {
    async fn publish(&self, call_id: &str, record: IngestRecord) -> Result<(), Error> {
        let queue = self.queue_for(call_id);
        let mut pending = queue.pending.lock();

        // Backpressure is scoped per (call, speaker): a flooding speaker
        // must not cost a quiet sibling their frames (spec §4.7, §8
        // scenario 6 "other sessions unaffected").
        let depth_for_speaker = pending.iter().filter(|r| r.speaker_id == record.speaker_id).count();
        if depth_for_speaker >= self.backpressure_max {
            if let Some(pos) = pending.iter().position(|r| r.speaker_id == record.speaker_id) {
                pending.remove(pos);
                metrics::counter!("stream_dropped_frames_total", "call_id" => call_id.to_string())
                    .increment(1);
            }
        }
        pending.push_back(record);
        Ok(())
    }

    async fn consume(
        &self,
        call_id: &str,
        _consumer_group: &str,
        max_records: usize,
    ) -> Result<Vec<DeliveredRecord>, Error> {
        let queue = self.queue_for(call_id);
        let mut out = Vec::with_capacity(max_records);
        let mut pending = queue.pending.lock();
        for _ in 0..max_records {
            let Some(record) = pending.pop_front() else {
                break;
            };
            let ack_id = uuid::Uuid::new_v4().to_string();
            queue.in_flight.insert(
                ack_id.clone(),
                InFlight {
                    record: record.clone(),
                    claimed_at: Instant::now(),
                },
            );
            out.push(DeliveredRecord { ack_id, record });
        }
        Ok(out)
    }

    async fn ack(&self, call_id: &str, ack_id: &str) -> Result<(), Error> {
        let queue = self.queue_for(call_id);
        queue.in_flight.remove(ack_id);
        Ok(())
    }

    async fn reclaim_expired(&self, call_id: &str) -> Result<usize, Error> {
        let queue = self.queue_for(call_id);
        let mut expired_ids = Vec::new();
        for entry in queue.in_flight.iter() {
            if entry.value().claimed_at.elapsed() >= self.visibility_timeout {
                expired_ids.push(entry.key().clone());
            }
        }
        let reclaimed = expired_ids.len();
        let mut pending = queue.pending.lock();
        for id in expired_ids {
            if let Some((_, in_flight)) = queue.in_flight.remove(&id) {
                pending.push_back(in_flight.record);
            }
        }
        Ok(reclaimed)
    }
}

pub struct InMemoryDeliveryBus {
    channels: DashMap<String, broadcast::Sender<TranslationResult>>,
    capacity: usize,
}

impl InMemoryDeliveryBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    fn channel_for(&self, call_id: &str) -> broadcast::Sender<TranslationResult> {
        self.channels
            .entry(call_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

#[async_trait]
impl DeliveryBus for InMemoryDeliveryBus {
    async fn publish(&self, call_id: &str, result: TranslationResult) -> Result<(), Error> {
        let tx = self.channel_for(call_id);
        // No receivers yet is not an error: a call can be quiet between
        // joins, and the Delivery Bus doesn't buffer for absent parties.
        let _ = tx.send(result);
        Ok(())
    }

    async fn subscribe(
        &self,
        call_id: &str,
    ) -> Result<broadcast::Receiver<TranslationResult>, Error> {
        Ok(self.channel_for(call_id).subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{Language, PcmBytes};

    fn record(call_id: &str) -> IngestRecord {
        IngestRecord {
            call_id: call_id.to_string(),
            speaker_id: "spk-1".to_string(),
            source_lang: Language::from("en"),
            pcm: PcmBytes::new(vec![0u8; 4]),
            frame_ts_ms: 0,
            seq: 0,
            enqueued_at_ms: 0,
        }
    }

    #[tokio::test]
    async fn publish_then_consume_round_trips() {
        let stream = InMemoryIngestStream::new(64, Duration::from_secs(10));
        stream.publish("call-1", record("call-1")).await.unwrap();
        let delivered = stream.consume("call-1", "group", 10).await.unwrap();
        assert_eq!(delivered.len(), 1);
    }

    #[tokio::test]
    async fn backpressure_drops_oldest_when_full() {
        let stream = InMemoryIngestStream::new(2, Duration::from_secs(10));
        stream.publish("call-1", record("call-1")).await.unwrap();
        stream.publish("call-1", record("call-1")).await.unwrap();
        stream.publish("call-1", record("call-1")).await.unwrap();

        let delivered = stream.consume("call-1", "group", 10).await.unwrap();
        assert_eq!(delivered.len(), 2);
    }

    #[tokio::test]
    async fn ack_removes_from_in_flight_so_reclaim_finds_nothing() {
        let stream = InMemoryIngestStream::new(64, Duration::from_millis(0));
        stream.publish("call-1", record("call-1")).await.unwrap();
        let delivered = stream.consume("call-1", "group", 10).await.unwrap();
        stream.ack("call-1", &delivered[0].ack_id).await.unwrap();
        let reclaimed = stream.reclaim_expired("call-1").await.unwrap();
        assert_eq!(reclaimed, 0);
    }

    #[tokio::test]
    async fn unacked_record_is_reclaimed_after_visibility_timeout() {
        let stream = InMemoryIngestStream::new(64, Duration::from_millis(0));
        stream.publish("call-1", record("call-1")).await.unwrap();
        let _delivered = stream.consume("call-1", "group", 10).await.unwrap();

        let reclaimed = stream.reclaim_expired("call-1").await.unwrap();
        assert_eq!(reclaimed, 1);

        let redelivered = stream.consume("call-1", "group", 10).await.unwrap();
        assert_eq!(redelivered.len(), 1);
    }

    #[tokio::test]
    async fn delivery_bus_fans_out_to_subscribers() {
        let bus = InMemoryDeliveryBus::new(16);
        let mut rx1 = bus.subscribe("call-1").await.unwrap();
        let mut rx2 = bus.subscribe("call-1").await.unwrap();

        let result = TranslationResult {
            utterance_id: "u1".into(),
            call_id: "call-1".into(),
            speaker_id: "spk-1".into(),
            original_text: "hi".into(),
            source_lang: Language::from("en"),
            per_language: vec![],
            timestamp_ms: 0,
        };
        bus.publish("call-1", result).await.unwrap();

        assert_eq!(rx1.recv().await.unwrap().utterance_id, "u1");
        assert_eq!(rx2.recv().await.unwrap().utterance_id, "u1");
    }
}
