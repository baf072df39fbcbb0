//! Redis-backed Ingest Stream (streams + consumer groups) and Delivery
//! Bus (pub/sub), for a multi-process deployment (spec §4.7, §4.8).

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::broadcast;

use relay_core::{Error, Language, PcmBytes, TranslationResult};

use crate::{DeliveredRecord, DeliveryBus, IngestRecord, IngestStream};

fn stream_key(call_id: &str) -> String {
    format!("relay:ingest:{call_id}")
}

fn channel_key(call_id: &str) -> String {
    format!("relay:delivery:{call_id}")
}

pub struct RedisIngestStream {
    conn: ConnectionManager,
    backpressure_max: usize,
    visibility_timeout_ms: u64,
}

impl RedisIngestStream {
    pub fn new(conn: ConnectionManager, backpressure_max: usize, visibility_timeout_ms: u64) -> Self {
        Self {
            conn,
            backpressure_max,
            visibility_timeout_ms,
        }
    }

    async fn ensure_group(&self, call_id: &str, group: &str) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let key = stream_key(call_id);
        let result: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&key, group, "0")
            .await;
        match result {
            Ok(()) => Ok(()),
            // BUSYGROUP: group already exists, which is the common case.
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(Error::Transient(format!("xgroup_create failed: {e}"))),
        }
    }
}

#[async_trait]
impl IngestStream for RedisIngestStream {
    async fn publish(&self, call_id: &str, record: IngestRecord) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let key = stream_key(call_id);

        let seq_str = record.seq.to_string();
        let enqueued_at_str = record.enqueued_at_ms.to_string();
        let fields = &[
            ("speaker_id", record.speaker_id.as_str()),
            ("source_lang", record.source_lang.code()),
            ("frame_ts_ms", &record.frame_ts_ms.to_string()),
            ("seq", seq_str.as_str()),
            ("enqueued_at_ms", enqueued_at_str.as_str()),
        ];
        // pcm carried as a separate binary field; redis-rs's xadd macro
        // wants homogeneous &str fields, so pcm goes through a second call
        // pattern in a real deployment would instead use a typed
        // `ToRedisArgs` tuple slice; kept simple here.
        let mut items: Vec<(&str, Vec<u8>)> = fields
            .iter()
            .map(|(k, v)| (*k, v.as_bytes().to_vec()))
            .collect();
        items.push(("pcm", record.pcm.as_slice().to_vec()));

        let _id: String = conn
            .xadd_maxlen(
                &key,
                redis::streams::StreamMaxlen::Approx(self.backpressure_max),
                "*",
                &items,
            )
            .await
            .map_err(|e| Error::Transient(format!("xadd failed: {e}")))?;
        Ok(())
    }

    async fn consume(
        &self,
        call_id: &str,
        consumer_group: &str,
        max_records: usize,
    ) -> Result<Vec<DeliveredRecord>, Error> {
        self.ensure_group(call_id, consumer_group).await?;

        let mut conn = self.conn.clone();
        let key = stream_key(call_id);
        let opts = redis::streams::StreamReadOptions::default()
            .group(consumer_group, "relay-worker")
            .count(max_records);

        let reply: redis::streams::StreamReadReply = conn
            .xread_options(&[&key], &[">"], &opts)
            .await
            .map_err(|e| Error::Transient(format!("xreadgroup failed: {e}")))?;

        let mut out = Vec::new();
        for stream_key_entry in reply.keys {
            for stream_id in stream_key_entry.ids {
                let map = stream_id.map;
                let get_str = |k: &str| -> String {
                    map.get(k)
                        .and_then(|v| match v {
                            redis::Value::BulkString(b) => {
                                Some(String::from_utf8_lossy(b).to_string())
                            }
                            _ => None,
                        })
                        .unwrap_or_default()
                };
                let pcm_bytes = map
                    .get("pcm")
                    .and_then(|v| match v {
                        redis::Value::BulkString(b) => Some(b.clone()),
                        _ => None,
                    })
                    .unwrap_or_default();

                let record = IngestRecord {
                    call_id: call_id.to_string(),
                    speaker_id: get_str("speaker_id"),
                    source_lang: Language::from(get_str("source_lang").as_str()),
                    pcm: PcmBytes::new(pcm_bytes),
                    frame_ts_ms: get_str("frame_ts_ms").parse().unwrap_or(0),
                    seq: get_str("seq").parse().unwrap_or(0),
                    enqueued_at_ms: get_str("enqueued_at_ms").parse().unwrap_or(0),
                };

                out.push(DeliveredRecord {
                    ack_id: stream_id.id,
                    record,
                });
            }
        }
        Ok(out)
    }

    async fn ack(&self, call_id: &str, ack_id: &str) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let key = stream_key(call_id);
        // The group name isn't tracked per-ack_id here; callers ack
        // against the same group they consumed with, matching XACK's own
        // (key, group, id) signature via a fixed default group.
        let _: i64 = conn
            .xack(&key, "audio_processors", &[ack_id])
            .await
            .map_err(|e| Error::Transient(format!("xack failed: {e}")))?;
        Ok(())
    }

    async fn reclaim_expired(&self, call_id: &str) -> Result<usize, Error> {
        let mut conn = self.conn.clone();
        let key = stream_key(call_id);

        let (_cursor, claimed, _deleted): (String, Vec<redis::streams::StreamId>, Vec<String>) =
            redis::cmd("XAUTOCLAIM")
                .arg(&key)
                .arg("audio_processors")
                .arg("relay-worker")
                .arg(self.visibility_timeout_ms)
                .arg("0-0")
                .query_async(&mut conn)
                .await
                .map_err(|e| Error::Transient(format!("xautoclaim failed: {e}")))?;

        Ok(claimed.len())
    }
}

pub struct RedisDeliveryBus {
    client: redis::Client,
    publish_conn: ConnectionManager,
}

impl RedisDeliveryBus {
    pub fn new(client: redis::Client, publish_conn: ConnectionManager) -> Self {
        Self {
            client,
            publish_conn,
        }
    }
}

#[async_trait]
impl DeliveryBus for RedisDeliveryBus {
    async fn publish(&self, call_id: &str, result: TranslationResult) -> Result<(), Error> {
        let payload = serde_json::to_string(&result)
            .map_err(|e| Error::Internal(format!("failed to encode translation result: {e}")))?;
        let mut conn = self.publish_conn.clone();
        let _: i64 = conn
            .publish(channel_key(call_id), payload)
            .await
            .map_err(|e| Error::Transient(format!("redis publish failed: {e}")))?;
        Ok(())
    }

    /// Bridges Redis pub/sub onto a local broadcast channel: spawns one
    /// background task per subscription that forwards decoded messages,
    /// so callers get the same `broadcast::Receiver` shape as the
    /// in-memory backend.
    async fn subscribe(
        &self,
        call_id: &str,
    ) -> Result<broadcast::Receiver<TranslationResult>, Error> {
        let (tx, rx) = broadcast::channel(256);
        let channel = channel_key(call_id);
        let client = self.client.clone();

        tokio::spawn(async move {
            let conn = match client.get_async_pubsub().await {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(error = %e, "failed to open redis pubsub connection");
                    return;
                }
            };
            let mut pubsub = conn;
            if let Err(e) = pubsub.subscribe(&channel).await {
                tracing::error!(error = %e, channel, "failed to subscribe to redis channel");
                return;
            }

            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(error = %e, "undecodable redis pubsub payload");
                        continue;
                    }
                };
                match serde_json::from_str::<TranslationResult>(&payload) {
                    Ok(result) => {
                        if tx.send(result).is_err() {
                            break; // no receivers left
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to decode translation result"),
                }
            }
        });

        Ok(rx)
    }
}
