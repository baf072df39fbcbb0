//! WebSocket connection handling: upgrade, auth, the per-connection read
//! loop, and the two tasks each connection spawns — a writer draining the
//! Session's outbound queue, and a Delivery Bus subscriber forwarding
//! this user's per-language results. Per-connection state (mute, rate
//! limiter, last-activity) is owned entirely by this task; nothing here
//! is shared behind a lock with another connection's task.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use relay_core::{Call, CallStatus, Participant, PcmBytes, TranslationResult};
use relay_transport::IngestRecord;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::auth::{self, SessionClaims};
use crate::rate_limit::RateLimiter;
use crate::session::{OutboundEvent, Session};
use crate::state::AppState;
use crate::worker;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundControl {
    Heartbeat,
    Mute { muted: bool },
    Leave,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireOutbound<'a> {
    Connected {
        session_id: &'a str,
        call_language: &'a str,
    },
    Translation {
        original_text: &'a str,
        translated_text: &'a str,
        source_lang: &'a str,
        target_lang: &'a str,
        speaker_id: &'a str,
        timestamp_ms: u64,
        has_audio: bool,
    },
    InterimTranscript {
        text: &'a str,
        is_final: bool,
        source_lang: &'a str,
        speaker_id: &'a str,
        confidence: f32,
    },
    HeartbeatAck,
    ParticipantJoined {
        user_id: &'a str,
    },
    ParticipantLeft {
        user_id: &'a str,
    },
    MuteStatusChanged {
        user_id: &'a str,
        muted: bool,
    },
    CallEnded {
        reason: &'a str,
    },
    Error {
        message: &'a str,
    },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<ConnectParams>,
) -> Response {
    let claims = {
        let config = state.config.read();
        auth::authenticate(&config, params.token.as_deref())
    };
    let claims = match claims {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(error = %e, "websocket authentication failed");
            return (StatusCode::from(e), "authentication failed").into_response();
        }
    };

    if let Err(e) = ensure_call_and_participant(&state, &claims).await {
        tracing::error!(error = %e, call_id = %claims.call_id, "failed to establish call/participant state");
        return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
    }

    state.recipients.invalidate(&claims.call_id);
    worker::ensure_worker(state.clone(), claims.call_id.clone());

    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, claims))
}

async fn ensure_call_and_participant(state: &AppState, claims: &SessionClaims) -> Result<(), relay_core::Error> {
    if state.call_store.get_call(&claims.call_id).await?.is_none() {
        state
            .call_store
            .create_call(Call {
                call_id: claims.call_id.clone(),
                call_language: claims.source_language(),
                status: CallStatus::Ongoing,
                created_at: Utc::now(),
            })
            .await?;
    }

    let already_joined = state
        .call_store
        .active_participants(&claims.call_id)
        .await?
        .iter()
        .any(|p| p.user_id == claims.user_id);

    if !already_joined {
        state
            .call_store
            .join(Participant {
                call_id: claims.call_id.clone(),
                user_id: claims.user_id.clone(),
                spoken_lang: claims.source_language(),
                dubbing_required: false,
                voice_profile_ref: None,
                voice_clone_quality_score: None,
                joined_at: Utc::now(),
                left_at: None,
            })
            .await?;
    }

    Ok(())
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String, claims: SessionClaims) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundEvent>();

    let (session, is_reconnect) = state.sessions.connect(
        session_id,
        claims.call_id.clone(),
        claims.user_id.clone(),
        claims.source_language(),
        claims.target_language(),
        outbound_tx,
    );

    metrics::counter!("ws_connections_total").increment(1);
    if is_reconnect {
        metrics::counter!("ws_reconnects_total").increment(1);
    } else {
        broadcast_to_call(
            &state,
            &claims.call_id,
            &claims.user_id,
            OutboundEvent::ParticipantJoined { user_id: claims.user_id.clone() },
        );
    }

    let _ = session.send(OutboundEvent::Connected {
        session_id: session.session_id(),
        call_language: claims.source_language(),
    });

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            for msg in to_ws_messages(event) {
                if ws_tx.send(msg).await.is_err() {
                    return;
                }
            }
        }
    });

    let delivery_task = {
        let state = state.clone();
        let session = session.clone();
        let call_id = claims.call_id.clone();
        tokio::spawn(async move {
            let mut receiver = match state.delivery.subscribe(&call_id).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(call_id = %call_id, error = %e, "delivery bus subscribe failed");
                    return;
                }
            };
            loop {
                match receiver.recv().await {
                    Ok(result) => forward_result(&session, &result),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(call_id = %call_id, skipped, "delivery bus receiver lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    let (rate_limit_enabled, max_frames_per_second) = {
        let config = state.config.read();
        (config.server.rate_limit.enabled, config.server.rate_limit.max_frames_per_second)
    };
    let rate_limiter = RateLimiter::new(max_frames_per_second);
    let heartbeat_timeout = state.sessions.heartbeat_timeout();

    let mut graceful_leave = false;
    let mut next_seq: u64 = 0;

    loop {
        let next = tokio::time::timeout(heartbeat_timeout, ws_rx.next()).await;
        let msg = match next {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(_))) | Ok(None) => break,
            Err(_) => {
                tracing::info!(call_id = %claims.call_id, user_id = %claims.user_id, "session heartbeat timed out");
                metrics::counter!("ws_heartbeat_timeouts_total").increment(1);
                break;
            }
        };

        match msg {
            Message::Binary(data) => {
                session.touch();
                if data.len() < 100 {
                    continue;
                }
                if rate_limit_enabled && rate_limiter.check().is_err() {
                    metrics::counter!("ws_rate_limited_frames_total").increment(1);
                    continue;
                }
                if session.muted() {
                    continue;
                }

                let frame_ts_ms = (Utc::now() - session.connected_at).num_milliseconds().max(0) as u64;
                let seq = next_seq;
                next_seq += 1;
                let record = IngestRecord {
                    call_id: claims.call_id.clone(),
                    speaker_id: claims.user_id.clone(),
                    source_lang: claims.source_language(),
                    pcm: PcmBytes::new(data),
                    frame_ts_ms,
                    seq,
                    enqueued_at_ms: Utc::now().timestamp_millis().max(0) as u64,
                };
                if let Err(e) = state.ingest.publish(&claims.call_id, record).await {
                    tracing::warn!(call_id = %claims.call_id, error = %e, "ingest publish failed");
                }
            }
            Message::Text(text) => {
                session.touch();
                match serde_json::from_str::<InboundControl>(&text) {
                    Ok(InboundControl::Heartbeat) => {
                        let _ = session.send(OutboundEvent::HeartbeatAck);
                    }
                    Ok(InboundControl::Mute { muted }) => {
                        session.set_muted(muted);
                        if let Err(e) = state.call_store.set_muted(&claims.call_id, &claims.user_id, muted).await {
                            tracing::warn!(error = %e, "set_muted failed");
                        }
                        broadcast_to_call(
                            &state,
                            &claims.call_id,
                            &claims.user_id,
                            OutboundEvent::MuteStatusChanged { user_id: claims.user_id.clone(), muted },
                        );
                    }
                    Ok(InboundControl::Leave) => {
                        graceful_leave = true;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "malformed control message");
                        let _ = session.send(OutboundEvent::Error { message: "malformed control message".into() });
                    }
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    writer.abort();
    delivery_task.abort();

    if graceful_leave {
        finalize_leave(&state, &claims).await;
        state.sessions.remove(&claims.call_id, &claims.user_id);
    } else {
        let state = state.clone();
        let claims = claims.clone();
        state.sessions.disconnect(&session, move || {
            tokio::spawn(async move {
                finalize_leave(&state, &claims).await;
                state.sessions.remove(&claims.call_id, &claims.user_id);
            });
        });
    }
}

async fn finalize_leave(state: &AppState, claims: &SessionClaims) {
    if let Err(e) = state.call_store.leave(&claims.call_id, &claims.user_id).await {
        tracing::warn!(call_id = %claims.call_id, error = %e, "call_store leave failed");
        return;
    }
    state.recipients.invalidate(&claims.call_id);
    broadcast_to_call(
        state,
        &claims.call_id,
        &claims.user_id,
        OutboundEvent::ParticipantLeft { user_id: claims.user_id.clone() },
    );

    match state.call_store.active_participants(&claims.call_id).await {
        Ok(remaining) if remaining.is_empty() => {
            if let Err(e) = state.call_store.end_call(&claims.call_id).await {
                tracing::warn!(call_id = %claims.call_id, error = %e, "end_call failed");
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(call_id = %claims.call_id, error = %e, "active_participants failed"),
    }
}

fn broadcast_to_call(state: &AppState, call_id: &str, exclude_user_id: &str, event: OutboundEvent) {
    for sibling in state.sessions.sessions_for_call(call_id) {
        if sibling.user_id == exclude_user_id {
            continue;
        }
        sibling.send(event.clone());
    }
}

fn forward_result(session: &Arc<Session>, result: &TranslationResult) {
    for per_language in &result.per_language {
        if !per_language.recipient_ids.iter().any(|id| id == &session.user_id) {
            continue;
        }
        session.send(OutboundEvent::Translation {
            original_text: result.original_text.clone(),
            translated_text: per_language.text.clone(),
            source_lang: result.source_lang.clone(),
            target_lang: per_language.target_lang.clone(),
            speaker_id: result.speaker_id.clone(),
            timestamp_ms: result.timestamp_ms,
            audio: per_language.audio_bytes.clone(),
        });
    }
}

fn to_ws_messages(event: OutboundEvent) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    match event {
        OutboundEvent::Connected { session_id, call_language } => {
            messages.push(json_message(&WireOutbound::Connected {
                session_id: &session_id,
                call_language: call_language.code(),
            }));
        }
        OutboundEvent::Translation {
            original_text,
            translated_text,
            source_lang,
            target_lang,
            speaker_id,
            timestamp_ms,
            audio,
        } => {
            messages.push(json_message(&WireOutbound::Translation {
                original_text: &original_text,
                translated_text: &translated_text,
                source_lang: source_lang.code(),
                target_lang: target_lang.code(),
                speaker_id: &speaker_id,
                timestamp_ms,
                has_audio: audio.is_some(),
            }));
            if let Some(bytes) = audio {
                messages.push(Message::Binary(bytes));
            }
        }
        OutboundEvent::InterimTranscript { text, is_final, source_lang, speaker_id, confidence } => {
            messages.push(json_message(&WireOutbound::InterimTranscript {
                text: &text,
                is_final,
                source_lang: source_lang.code(),
                speaker_id: &speaker_id,
                confidence,
            }));
        }
        OutboundEvent::HeartbeatAck => messages.push(json_message(&WireOutbound::HeartbeatAck)),
        OutboundEvent::ParticipantJoined { user_id } => {
            messages.push(json_message(&WireOutbound::ParticipantJoined { user_id: &user_id }));
        }
        OutboundEvent::ParticipantLeft { user_id } => {
            messages.push(json_message(&WireOutbound::ParticipantLeft { user_id: &user_id }));
        }
        OutboundEvent::MuteStatusChanged { user_id, muted } => {
            messages.push(json_message(&WireOutbound::MuteStatusChanged { user_id: &user_id, muted }));
        }
        OutboundEvent::CallEnded { reason } => {
            messages.push(json_message(&WireOutbound::CallEnded { reason: &reason }));
        }
        OutboundEvent::Error { message } => {
            messages.push(json_message(&WireOutbound::Error { message: &message }));
        }
    }
    messages
}

fn json_message(value: &impl Serialize) -> Message {
    Message::Text(serde_json::to_string(value).expect("WireOutbound always serializes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::Language;

    #[test]
    fn connected_event_serializes_to_a_tagged_json_message() {
        let messages = to_ws_messages(OutboundEvent::Connected {
            session_id: "sess-1".to_string(),
            call_language: Language::from("en"),
        });
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            Message::Text(text) => {
                assert!(text.contains("\"type\":\"connected\""));
                assert!(text.contains("\"session_id\":\"sess-1\""));
            }
            _ => panic!("expected a text message"),
        }
    }

    #[test]
    fn translation_with_audio_emits_a_json_and_binary_frame() {
        let messages = to_ws_messages(OutboundEvent::Translation {
            original_text: "hello".into(),
            translated_text: "shalom".into(),
            source_lang: Language::from("en"),
            target_lang: Language::from("he"),
            speaker_id: "u1".into(),
            timestamp_ms: 1_000,
            audio: Some(vec![1, 2, 3]),
        });
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[1], Message::Binary(_)));
    }

    #[test]
    fn translation_without_audio_emits_only_json() {
        let messages = to_ws_messages(OutboundEvent::Translation {
            original_text: "hello".into(),
            translated_text: "shalom".into(),
            source_lang: Language::from("en"),
            target_lang: Language::from("he"),
            speaker_id: "u1".into(),
            timestamp_ms: 1_000,
            audio: None,
        });
        assert_eq!(messages.len(), 1);
    }
}
