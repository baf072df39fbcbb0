//! Shared application state: every process-wide service the Session
//! Orchestrator and the ingest Worker depend on, constructed once at
//! startup with explicit shutdown hooks (spec §9 "Globals").

use std::sync::Arc;

use parking_lot::RwLock;
use relay_cache::TtsCache;
use relay_config::{Settings, StoreBackend, TransportBackend};
use relay_orchestrator::TranslationProcessor;
use relay_pipeline::ContextStore;
use relay_speech::SpeechClient;
use relay_store::{
    CallStore, InMemoryCallStore, InMemoryTranscriptStore, PostgresCallStore,
    PostgresTranscriptStore, RecipientMap, TranscriptStore,
};
use relay_transport::{
    DeliveryBus, IngestStream, InMemoryDeliveryBus, InMemoryIngestStream, RedisDeliveryBus,
    RedisIngestStream,
};

use crate::session::SessionManager;
use crate::ServerError;

/// Everything the HTTP/WebSocket layer and the ingest worker share.
/// Cloning is cheap: every field is an `Arc` (or a `Copy`/`Arc<RwLock<_>>`
/// handle), matching the teacher's `AppState` shape in
/// `crates/server/src/state.rs`-equivalent wiring.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Settings>>,
    pub call_store: Arc<dyn CallStore>,
    pub transcripts: Arc<dyn TranscriptStore>,
    pub recipients: Arc<RecipientMap>,
    pub ingest: Arc<dyn IngestStream>,
    pub delivery: Arc<dyn DeliveryBus>,
    pub processor: Arc<TranslationProcessor>,
    pub sessions: Arc<SessionManager>,
    /// Active call ids the ingest worker should poll. Populated on join,
    /// pruned when a call's last participant leaves.
    pub active_calls: Arc<dashmap::DashSet<String>>,
}

impl AppState {
    /// Build application state entirely from in-memory backends,
    /// regardless of `config.store`/`config.transport`. Used by tests and
    /// by `main` as the fallback when a distributed backend fails to
    /// connect.
    pub fn in_memory(config: Settings) -> Self {
        let call_store: Arc<dyn CallStore> = Arc::new(InMemoryCallStore::new());
        let transcripts: Arc<dyn TranscriptStore> = Arc::new(InMemoryTranscriptStore::new());
        let ingest: Arc<dyn IngestStream> = Arc::new(InMemoryIngestStream::new(
            config.transport.stream_backpressure_max,
            std::time::Duration::from_millis(config.transport.visibility_timeout_ms),
        ));
        let delivery: Arc<dyn DeliveryBus> = Arc::new(InMemoryDeliveryBus::new(256));
        Self::assemble(config, call_store, transcripts, ingest, delivery)
    }

    /// Build application state honoring `config.store`/`config.transport`
    /// backend selection, connecting to Postgres/Redis as needed.
    pub async fn connect(config: Settings) -> Result<Self, ServerError> {
        let call_store: Arc<dyn CallStore> = match config.store.backend {
            StoreBackend::InMemory => Arc::new(InMemoryCallStore::new()),
            StoreBackend::Postgres => {
                let url = std::env::var("RELAY_DATABASE_URL").map_err(|_| {
                    ServerError::Internal("RELAY_DATABASE_URL is required for store.backend=postgres".into())
                })?;
                let pool = sqlx::PgPool::connect(&url)
                    .await
                    .map_err(|e| ServerError::Internal(format!("postgres connect failed: {e}")))?;
                Arc::new(PostgresCallStore::new(pool))
            }
        };

        let transcripts: Arc<dyn TranscriptStore> = match config.store.backend {
            StoreBackend::InMemory => Arc::new(InMemoryTranscriptStore::new()),
            StoreBackend::Postgres => {
                let url = std::env::var("RELAY_DATABASE_URL").map_err(|_| {
                    ServerError::Internal("RELAY_DATABASE_URL is required for store.backend=postgres".into())
                })?;
                let pool = sqlx::PgPool::connect(&url)
                    .await
                    .map_err(|e| ServerError::Internal(format!("postgres connect failed: {e}")))?;
                Arc::new(PostgresTranscriptStore::new(pool))
            }
        };

        let ingest: Arc<dyn IngestStream> = match config.transport.backend {
            TransportBackend::InMemory => Arc::new(InMemoryIngestStream::new(
                config.transport.stream_backpressure_max,
                std::time::Duration::from_millis(config.transport.visibility_timeout_ms),
            )),
            TransportBackend::Redis => {
                let client = redis::Client::open(config.transport.redis_url.as_str())
                    .map_err(|e| ServerError::Internal(format!("invalid redis url: {e}")))?;
                let conn = client
                    .get_connection_manager()
                    .await
                    .map_err(|e| ServerError::Internal(format!("redis connect failed: {e}")))?;
                Arc::new(RedisIngestStream::new(
                    conn,
                    config.transport.stream_backpressure_max,
                    config.transport.visibility_timeout_ms,
                ))
            }
        };

        let delivery: Arc<dyn DeliveryBus> = match config.transport.backend {
            TransportBackend::InMemory => Arc::new(InMemoryDeliveryBus::new(256)),
            TransportBackend::Redis => {
                let client = redis::Client::open(config.transport.redis_url.as_str())
                    .map_err(|e| ServerError::Internal(format!("invalid redis url: {e}")))?;
                let publish_conn = client
                    .get_connection_manager()
                    .await
                    .map_err(|e| ServerError::Internal(format!("redis connect failed: {e}")))?;
                Arc::new(RedisDeliveryBus::new(client, publish_conn))
            }
        };

        Ok(Self::assemble(config, call_store, transcripts, ingest, delivery))
    }

    fn assemble(
        config: Settings,
        call_store: Arc<dyn CallStore>,
        transcripts: Arc<dyn TranscriptStore>,
        ingest: Arc<dyn IngestStream>,
        delivery: Arc<dyn DeliveryBus>,
    ) -> Self {
        let recipients = Arc::new(RecipientMap::new(
            call_store.clone(),
            std::time::Duration::from_millis(config.store.recipient_map_ttl_ms),
        ));

        let speech = Arc::new(
            SpeechClient::new(config.speech.clone())
                .expect("speech client construction is infallible for a valid config"),
        );
        let cache = Arc::new(TtsCache::new(&config.cache));
        let context = Arc::new(ContextStore::new(config.speech.context_snippet_chars));

        let processor = Arc::new(TranslationProcessor::new(
            speech.clone(),
            speech.clone(),
            speech,
            cache,
            context,
            recipients.clone(),
            call_store.clone(),
            delivery.clone(),
            transcripts.clone(),
            &config.speech,
            config.store.include_speaker,
        ));

        Self {
            config: Arc::new(RwLock::new(config)),
            call_store,
            transcripts,
            recipients,
            ingest,
            delivery,
            processor,
            sessions: Arc::new(SessionManager::new()),
            active_calls: Arc::new(dashmap::DashSet::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_state_builds_without_external_services() {
        let state = AppState::in_memory(Settings::default());
        assert_eq!(state.active_calls.len(), 0);
    }
}
