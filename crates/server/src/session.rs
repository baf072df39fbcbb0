//! Session Orchestrator state (spec §4.9): one `Session` per (call, user),
//! owned exclusively by the task running its WebSocket connection.
//! Mutation from other tasks — the Delivery Bus forwarder, a sibling
//! session's mute broadcast — goes through `Session::send`, a message-passing
//! handle onto the task currently attached to the socket, rather than a
//! lock shared across tasks ("give each Session to a single task; mutate
//! via message passing").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use relay_config::HeartbeatConfig;
use relay_core::Language;
use tokio::sync::{mpsc, oneshot};

/// A message the Session's attached socket task must forward to the
/// client, framed per the wire protocol's JSON/binary split.
#[derive(Debug, Clone)]
pub enum OutboundEvent {
    Connected {
        session_id: String,
        call_language: Language,
    },
    Translation {
        original_text: String,
        translated_text: String,
        source_lang: Language,
        target_lang: Language,
        speaker_id: String,
        timestamp_ms: u64,
        audio: Option<Vec<u8>>,
    },
    InterimTranscript {
        text: String,
        is_final: bool,
        source_lang: Language,
        speaker_id: String,
        confidence: f32,
    },
    HeartbeatAck,
    ParticipantJoined {
        user_id: String,
    },
    ParticipantLeft {
        user_id: String,
    },
    MuteStatusChanged {
        user_id: String,
        muted: bool,
    },
    CallEnded {
        reason: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Authenticated,
    Joined,
    Closing,
}

/// One active call connection for one user. `session_id` is replaced in
/// place on reconnect; `(call_id, user_id)` is the stable identity a
/// `SessionManager` reclaims by.
pub struct Session {
    session_id: RwLock<String>,
    pub call_id: String,
    pub user_id: String,
    pub source_lang: Language,
    pub target_lang: Language,
    pub connected_at: DateTime<Utc>,
    muted: AtomicBool,
    state: RwLock<SessionState>,
    last_activity: RwLock<Instant>,
    outbound: RwLock<Option<mpsc::UnboundedSender<OutboundEvent>>>,
    /// Set while the Session is in its reconnection grace window; sending
    /// on it cancels the scheduled finalize-leave.
    pending_leave: RwLock<Option<oneshot::Sender<()>>>,
}

impl Session {
    fn new(session_id: String, call_id: String, user_id: String, source_lang: Language, target_lang: Language) -> Self {
        Self {
            session_id: RwLock::new(session_id),
            call_id,
            user_id,
            source_lang,
            target_lang,
            connected_at: Utc::now(),
            muted: AtomicBool::new(false),
            state: RwLock::new(SessionState::Authenticated),
            last_activity: RwLock::new(Instant::now()),
            outbound: RwLock::new(None),
            pending_leave: RwLock::new(None),
        }
    }

    pub fn session_id(&self) -> String {
        self.session_id.read().clone()
    }

    pub fn muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    /// Attach this session to a freshly-upgraded socket's outbound queue.
    /// Cancels any pending finalize-leave from a prior abrupt disconnect.
    fn attach(&self, session_id: String, tx: mpsc::UnboundedSender<OutboundEvent>) {
        *self.session_id.write() = session_id;
        *self.outbound.write() = Some(tx);
        self.set_state(SessionState::Joined);
        self.touch();
        if let Some(cancel) = self.pending_leave.write().take() {
            let _ = cancel.send(());
        }
    }

    fn detach(&self) {
        *self.outbound.write() = None;
    }

    /// Forward an event to whichever socket task is currently attached.
    /// Returns `false` when no socket is attached (disconnected, in grace
    /// or already closed) — the caller logs and moves on.
    pub fn send(&self, event: OutboundEvent) -> bool {
        match self.outbound.read().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

/// Registry of live Sessions, keyed by the stable `(call_id, user_id)`
/// identity rather than the client-supplied `session_id`, since a
/// reconnect may arrive with a different `session_id` for the same
/// (call, user) pair.
pub struct SessionManager {
    heartbeat: HeartbeatConfig,
    sessions: DashMap<(String, String), Arc<Session>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_heartbeat(HeartbeatConfig::default())
    }

    pub fn with_heartbeat(heartbeat: HeartbeatConfig) -> Self {
        Self {
            heartbeat,
            sessions: DashMap::new(),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat.heartbeat_timeout_ms)
    }

    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_millis(self.heartbeat.reconnect_grace_ms)
    }

    /// Connect or reclaim a Session for (call_id, user_id). Returns the
    /// session plus whether this was a reconnect onto an existing slot.
    #[allow(clippy::too_many_arguments)]
    pub fn connect(
        &self,
        session_id: String,
        call_id: String,
        user_id: String,
        source_lang: Language,
        target_lang: Language,
        outbound: mpsc::UnboundedSender<OutboundEvent>,
    ) -> (Arc<Session>, bool) {
        let key = (call_id.clone(), user_id.clone());
        if let Some(existing) = self.sessions.get(&key) {
            existing.attach(session_id, outbound);
            return (existing.clone(), true);
        }

        let session = Arc::new(Session::new(session_id.clone(), call_id, user_id, source_lang, target_lang));
        session.attach(session_id, outbound);
        self.sessions.insert(key, session.clone());
        (session, false)
    }

    /// Mark a Session disconnected and schedule its finalize-leave after
    /// the reconnect grace window, unless a reconnect cancels it first.
    pub fn disconnect<F>(&self, session: &Arc<Session>, on_grace_expired: F)
    where
        F: FnOnce() + Send + 'static,
    {
        session.detach();
        session.set_state(SessionState::Closing);

        let (tx, rx) = oneshot::channel();
        *session.pending_leave.write() = Some(tx);

        let grace = self.reconnect_grace();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(grace) => on_grace_expired(),
                _ = rx => {}
            }
        });
    }

    pub fn remove(&self, call_id: &str, user_id: &str) {
        self.sessions.remove(&(call_id.to_string(), user_id.to_string()));
    }

    /// Every live Session for a call, for control-message broadcast
    /// (mute, participant joined/left) and for call-ended teardown.
    pub fn sessions_for_call(&self, call_id: &str) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .filter(|e| e.key().0 == call_id)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn get(&self, call_id: &str, user_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .get(&(call_id.to_string(), user_id.to_string()))
            .map(|e| e.clone())
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lang() -> Language {
        Language::from("en")
    }

    #[test]
    fn connect_creates_a_new_session() {
        let manager = SessionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (session, is_reconnect) = manager.connect(
            "sess-1".into(), "call-1".into(), "u1".into(), lang(), lang(), tx,
        );
        assert!(!is_reconnect);
        assert_eq!(session.call_id, "call-1");
        assert_eq!(manager.count(), 1);
    }

    #[test]
    fn reconnect_reclaims_the_same_slot() {
        let manager = SessionManager::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (first, _) = manager.connect("sess-1".into(), "call-1".into(), "u1".into(), lang(), lang(), tx1);

        let (tx2, _rx2) = mpsc::unbounded_channel();
        let (second, is_reconnect) = manager.connect("sess-2".into(), "call-1".into(), "u1".into(), lang(), lang(), tx2);

        assert!(is_reconnect);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.session_id(), "sess-2");
        assert_eq!(manager.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_finalizes_after_grace_when_not_reclaimed() {
        let manager = SessionManager::with_heartbeat(HeartbeatConfig {
            heartbeat_interval_ms: 5_000,
            heartbeat_timeout_ms: 30_000,
            reconnect_grace_ms: 50,
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let (session, _) = manager.connect("sess-1".into(), "call-1".into(), "u1".into(), lang(), lang(), tx);

        let finalized = Arc::new(AtomicBool::new(false));
        let finalized_clone = finalized.clone();
        manager.disconnect(&session, move || {
            finalized_clone.store(true, Ordering::SeqCst);
        });

        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert!(finalized.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_within_grace_cancels_finalize() {
        let manager = SessionManager::with_heartbeat(HeartbeatConfig {
            heartbeat_interval_ms: 5_000,
            heartbeat_timeout_ms: 30_000,
            reconnect_grace_ms: 200,
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let (session, _) = manager.connect("sess-1".into(), "call-1".into(), "u1".into(), lang(), lang(), tx);

        let finalized = Arc::new(AtomicBool::new(false));
        let finalized_clone = finalized.clone();
        manager.disconnect(&session, move || {
            finalized_clone.store(true, Ordering::SeqCst);
        });

        tokio::time::advance(Duration::from_millis(50)).await;
        let (tx2, _rx2) = mpsc::unbounded_channel();
        manager.connect("sess-2".into(), "call-1".into(), "u1".into(), lang(), lang(), tx2);

        tokio::time::advance(Duration::from_millis(300)).await;
        tokio::task::yield_now().await;
        assert!(!finalized.load(Ordering::SeqCst));
    }
}
