//! Call-state store, Recipient-Map, and Transcript Store (spec §4.6).

pub mod in_memory;
pub mod postgres;
pub mod recipient_map;

use async_trait::async_trait;
use relay_core::{Call, Error, Participant, TranscriptEntry};

/// Read/write access to call and participant state. Join/leave/mute are
/// store operations, not in-place struct mutation (spec §9).
#[async_trait]
pub trait CallStore: Send + Sync {
    async fn create_call(&self, call: Call) -> Result<(), Error>;
    async fn get_call(&self, call_id: &str) -> Result<Option<Call>, Error>;
    async fn end_call(&self, call_id: &str) -> Result<(), Error>;

    async fn join(&self, participant: Participant) -> Result<(), Error>;
    async fn leave(&self, call_id: &str, user_id: &str) -> Result<(), Error>;
    async fn set_muted(&self, call_id: &str, user_id: &str, muted: bool) -> Result<(), Error>;

    /// All currently active (not-left) participants of a call.
    async fn active_participants(&self, call_id: &str) -> Result<Vec<Participant>, Error>;
}

/// Append-only historical record of every utterance's translations.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn append(&self, entry: TranscriptEntry) -> Result<(), Error>;
    async fn for_call(&self, call_id: &str) -> Result<Vec<TranscriptEntry>, Error>;
}

pub use in_memory::{InMemoryCallStore, InMemoryTranscriptStore};
pub use postgres::{PostgresCallStore, PostgresTranscriptStore};
pub use recipient_map::RecipientMap;
