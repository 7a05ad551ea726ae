//! STT relay — the candidate's live transcription socket.
//!
//! Flow:
//! 1. Browser connects to `/stt?token=<access-token>`
//! 2. First client message is a JSON config `{sample_rate, language, model}`
//! 3. Thereafter binary PCM frames flow up; the relay forwards them to
//!    the provider and pushes `{type:"interim"|"final"}` events back
//!
//! Provider drops reconnect up to 3 times (250/500/1000 ms). On
//! exhaustion the session degrades to text-only and the relay keeps
//! draining the browser side until it closes.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use candor_domain::stream::{PortalEvent, SttEvent};
use candor_domain::warning::WarningKind;
use candor_providers::stt::{SttConnection, SttParams};
use candor_sessions::SessionHandle;

use super::api_error;
use crate::state::AppState;

/// Backoff schedule for provider reconnects.
const RECONNECT_BACKOFF_MS: [u64; 3] = [250, 500, 1_000];

#[derive(Debug, Deserialize)]
pub struct SttQuery {
    token: Option<String>,
}

/// First client message on the socket.
#[derive(Debug, Deserialize)]
struct ClientConfig {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    sample_rate: Option<u32>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// GET /stt — upgrade to WebSocket after access-token redemption.
pub async fn stt_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<SttQuery>,
) -> Response {
    let Some(token) = query.token else {
        return api_error(StatusCode::UNAUTHORIZED, "missing access token");
    };
    let handle = match state.tokens.redeem(&token).await {
        Ok(h) => h,
        Err(e) => return api_error(StatusCode::UNAUTHORIZED, e.to_string()),
    };

    ws.on_upgrade(move |socket| relay(socket, state, handle))
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Relay loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn relay(socket: WebSocket, state: AppState, handle: Arc<SessionHandle>) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    // 1. Wait for the config message.
    let config = match wait_for_config(&mut ws_stream).await {
        Some(c) => c,
        None => {
            tracing::warn!(session_id = %handle.id, "browser closed before stt config");
            return;
        }
    };
    let mut params = SttParams::from_config(&state.config.stt, &handle.job.language);
    if let Some(language) = config.language {
        params.language = language;
    }
    if let Some(model) = config.model {
        params.model = model;
    }
    if let Some(rate) = config.sample_rate {
        params.sample_rate = rate;
    }

    tracing::info!(
        session_id = %handle.id,
        language = %params.language,
        model = %params.model,
        "stt relay open"
    );

    // 2. Writer task: session push events → browser.
    let mut events_rx = handle.subscribe();
    let writer = tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(event) => {
                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if ws_sink.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "portal event subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // 3. Provider connection with retry, then the pump loop.
    let mut conn = connect_with_retries(&state, &params, &handle).await;
    if conn.is_none() {
        state.dialogue.stream_ended(&handle, Some("stt connect failed".into())).await;
    }

    loop {
        if handle.cancel.is_cancelled() {
            break;
        }
        let mut provider_lost = false;
        match conn.as_mut() {
            Some(active) => {
                tokio::select! {
                    browser = ws_stream.next() => match browser {
                        Some(Ok(Message::Binary(frame))) => {
                            // A failed send means the provider side died
                            // mid-frame; reconnect below.
                            provider_lost = active.send_pcm(frame).await.is_err();
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::debug!(session_id = %handle.id, error = %e, "browser socket error");
                            break;
                        }
                    },
                    event = active.next_event() => match event {
                        Some(e) => process_stt_event(&handle, e).await,
                        None => provider_lost = true,
                    },
                }
            }
            // Degraded: keep the socket open for typed submissions and
            // push events, discard audio.
            None => match ws_stream.next().await {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }

        if provider_lost {
            conn = connect_with_retries(&state, &params, &handle).await;
            if conn.is_none() {
                state
                    .dialogue
                    .stream_ended(&handle, Some("stt reconnect exhausted".into()))
                    .await;
            }
        }
    }

    // Cleanup: closing the browser side closes the provider side
    // promptly; no audio is buffered past the close.
    if let Some(active) = conn.take() {
        active.close().await;
    }
    handle.push(PortalEvent::Ended);
    writer.abort();
    tracing::info!(session_id = %handle.id, "stt relay closed");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn wait_for_config(
    stream: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<ClientConfig> {
    // Give the browser 10 seconds to send the config.
    let timeout = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        while let Some(Ok(msg)) = stream.next().await {
            if let Message::Text(text) = msg {
                if let Ok(config) = serde_json::from_str::<ClientConfig>(&text) {
                    return Some(config);
                }
            }
        }
        None
    })
    .await;

    timeout.unwrap_or(None)
}

async fn connect_with_retries(
    state: &AppState,
    params: &SttParams,
    handle: &Arc<SessionHandle>,
) -> Option<SttConnection> {
    for (attempt, backoff_ms) in RECONNECT_BACKOFF_MS.iter().enumerate() {
        if handle.cancel.is_cancelled() {
            return None;
        }
        match SttConnection::connect(&state.config.stt, params).await {
            Ok(conn) => {
                if attempt > 0 {
                    tracing::info!(session_id = %handle.id, attempt, "stt reconnected");
                }
                return Some(conn);
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %handle.id,
                    attempt = attempt + 1,
                    error = %e,
                    "stt connect failed"
                );
                tokio::time::sleep(std::time::Duration::from_millis(*backoff_ms)).await;
            }
        }
    }
    None
}

/// Apply one provider event: accumulator update, browser echo, and
/// diarization-derived warnings.
async fn process_stt_event(handle: &Arc<SessionHandle>, event: SttEvent) {
    let mut state = handle.state.lock().await;
    state.accumulator.apply(&event);

    let speakers = event.speaker_count.unwrap_or(0);
    let text_empty = event.text.trim().is_empty();
    if speakers > 1 {
        state
            .warnings
            .try_record(WarningKind::MultipleSpeakers, event.arrived_at, None);
    } else if event.is_final && text_empty && speakers > 0 {
        // Voice activity without transcribable speech.
        state
            .warnings
            .try_record(WarningKind::NoiseBurst, event.arrived_at, None);
    }
    drop(state);

    if text_empty {
        return;
    }
    let echo = if event.is_final {
        PortalEvent::Final {
            text: event.text,
            at: event.arrived_at,
        }
    } else {
        PortalEvent::Interim {
            text: event.text,
            at: event.arrived_at,
        }
    };
    handle.push(echo);
}

#[cfg(test)]
mod tests {
    use super::*;
    use candor_domain::slot::{AiType, Difficulty};
    use candor_sessions::JobContext;
    use chrono::Utc;
    use uuid::Uuid;

    fn session() -> Arc<SessionHandle> {
        SessionHandle::new(
            Uuid::new_v4(),
            JobContext {
                candidate_name: "Jane".into(),
                company: "acme".into(),
                role: "backend".into(),
                job_description: String::new(),
                candidate_resume: String::new(),
                ai_type: AiType::Technical,
                difficulty: Difficulty::Medium,
                language: "en".into(),
            },
            6,
            10,
            Utc::now(),
            Utc::now() + chrono::Duration::minutes(30),
        )
    }

    fn ev(text: &str, is_final: bool, speakers: Option<u32>) -> SttEvent {
        SttEvent {
            text: text.into(),
            is_final,
            arrived_at: Utc::now(),
            speaker_count: speakers,
        }
    }

    #[tokio::test]
    async fn events_accumulate_and_echo() {
        let handle = session();
        let mut rx = handle.subscribe();

        process_stt_event(&handle, ev("hello", false, Some(1))).await;
        process_stt_event(&handle, ev("hello world", true, Some(1))).await;

        assert!(matches!(rx.recv().await, Ok(PortalEvent::Interim { .. })));
        assert!(matches!(rx.recv().await, Ok(PortalEvent::Final { .. })));
        let state = handle.state.lock().await;
        assert_eq!(state.accumulator.snapshot(), "hello world");
        assert!(state.warnings.all().is_empty());
    }

    #[tokio::test]
    async fn diarization_raises_multiple_speakers() {
        let handle = session();
        process_stt_event(&handle, ev("two people talking", true, Some(2))).await;
        let state = handle.state.lock().await;
        assert_eq!(state.warnings.all().len(), 1);
        assert_eq!(state.warnings.all()[0].kind, WarningKind::MultipleSpeakers);
    }

    #[tokio::test]
    async fn untranscribable_voice_is_a_noise_burst() {
        let handle = session();
        process_stt_event(&handle, ev("", true, Some(1))).await;
        let state = handle.state.lock().await;
        assert_eq!(state.warnings.all()[0].kind, WarningKind::NoiseBurst);
    }

    #[test]
    fn client_config_parses_partial_json() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"sample_rate": 16000, "language": "hi"}"#).unwrap();
        assert_eq!(config.sample_rate, Some(16_000));
        assert_eq!(config.language.as_deref(), Some("hi"));
        assert!(config.model.is_none());
    }
}
