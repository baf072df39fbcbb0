//! Ingest Stream and Delivery Bus transports (spec §4.7, §4.8).
//!
//! Two independent pieces of plumbing, each with an `InMemory` backend
//! (single-process, used in tests and local runs) and a `Redis` backend
//! (multi-process deployment): the Ingest Stream carries raw PCM frames
//! from a session's websocket handler to the Chunker with consumer-group
//! semantics so a crashed worker's unacked frames get replayed; the
//! Delivery Bus fans out a `TranslationResult` to every connected
//! recipient session for a call.

pub mod in_memory;
pub mod redis_backend;

use async_trait::async_trait;
use relay_core::{Error, Language, PcmBytes, TranslationResult};

/// One raw-audio record as it enters the Ingest Stream.
#[derive(Debug, Clone)]
pub struct IngestRecord {
    pub call_id: String,
    pub speaker_id: String,
    pub source_lang: Language,
    pub pcm: PcmBytes,
    pub frame_ts_ms: u64,
    /// Monotonically increasing per (call, speaker), assigned by the
    /// producer. A gap between consecutive values indicates dropped
    /// frames upstream of the Ingest Stream; it must not be mistaken for
    /// a pause by the Chunker (spec §3 invariant).
    pub seq: u64,
    /// Wall-clock time the record was handed to the Ingest Stream, for
    /// queueing-latency observability independent of `frame_ts_ms`.
    pub enqueued_at_ms: u64,
}

/// A record handed back to a consumer, carrying the id it must `ack`
/// after successful processing (spec §4.7 "Replay for crashed workers").
#[derive(Debug, Clone)]
pub struct DeliveredRecord {
    pub ack_id: String,
    pub record: IngestRecord,
}

#[async_trait]
pub trait IngestStream: Send + Sync {
    /// Append one record for `call_id` (spec §4.7 "Backpressure": when the
    /// per-session queue is full, the oldest unconsumed record is dropped
    /// rather than blocking the producer).
    async fn publish(&self, call_id: &str, record: IngestRecord) -> Result<(), Error>;

    /// Claim up to `max_records` undelivered records for `consumer_group`,
    /// marking them in-flight until `ack`ed or their visibility timeout
    /// elapses.
    async fn consume(
        &self,
        call_id: &str,
        consumer_group: &str,
        max_records: usize,
    ) -> Result<Vec<DeliveredRecord>, Error>;

    /// Acknowledge successful processing of a previously consumed record.
    async fn ack(&self, call_id: &str, ack_id: &str) -> Result<(), Error>;

    /// Requeue any in-flight record whose visibility timeout has elapsed,
    /// making it eligible for `consume` again (spec §4.7 "Replay for
    /// crashed workers").
    async fn reclaim_expired(&self, call_id: &str) -> Result<usize, Error>;
}

#[async_trait]
pub trait DeliveryBus: Send + Sync {
    /// Publish one translation result for fan-out to every connected
    /// recipient of `call_id` (spec §4.8).
    async fn publish(&self, call_id: &str, result: TranslationResult) -> Result<(), Error>;

    /// Subscribe to a call's channel. Returns a receiver yielding each
    /// published `TranslationResult` in publish order.
    async fn subscribe(
        &self,
        call_id: &str,
    ) -> Result<tokio::sync::broadcast::Receiver<TranslationResult>, Error>;
}

pub use in_memory::{InMemoryDeliveryBus, InMemoryIngestStream};
pub use redis_backend::{RedisDeliveryBus, RedisIngestStream};
