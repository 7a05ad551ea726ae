//! Streaming speech-to-text client.
//!
//! One [`SttConnection`] per candidate turn stream: binary PCM frames
//! (16 kHz, 16-bit, mono, little-endian) go up; interim/final
//! recognition events come back. The relay owns reconnection policy —
//! this adapter only does one connection's worth of work.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use candor_domain::config::SttConfig;
use candor_domain::error::{Error, Result};
use candor_domain::stream::SttEvent;

use crate::util::resolve_api_key;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-session STT stream parameters (sent as query parameters).
#[derive(Debug, Clone)]
pub struct SttParams {
    pub language: String,
    pub model: String,
    pub sample_rate: u32,
    pub endpointing_ms: u32,
    pub utterance_end_ms: u32,
    pub interim_results: bool,
    pub diarize: bool,
}

impl SttParams {
    pub fn from_config(cfg: &SttConfig, language: &str) -> Self {
        Self {
            language: language.to_string(),
            model: cfg.model.clone(),
            sample_rate: cfg.sample_rate,
            endpointing_ms: cfg.endpointing_ms,
            utterance_end_ms: cfg.utterance_end_ms,
            interim_results: true,
            diarize: true,
        }
    }

    fn query_string(&self) -> String {
        format!(
            "model={}&language={}&sample_rate={}&encoding=linear16&channels=1\
             &endpointing={}&utterance_end_ms={}&interim_results={}&diarize={}",
            self.model,
            self.language,
            self.sample_rate,
            self.endpointing_ms,
            self.utterance_end_ms,
            self.interim_results,
            self.diarize,
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Upstream {
    Pcm(Vec<u8>),
    Finish,
}

/// A live provider connection: an audio sender and an event receiver.
/// Dropping the connection (or calling [`close`]) closes the provider
/// side; the pump task sends the close frame promptly, no audio is
/// buffered past it.
///
/// [`close`]: SttConnection::close
pub struct SttConnection {
    audio_tx: mpsc::Sender<Upstream>,
    events_rx: mpsc::Receiver<SttEvent>,
    pump: tokio::task::JoinHandle<()>,
}

impl SttConnection {
    /// Open one WebSocket session with the provider.
    pub async fn connect(cfg: &SttConfig, params: &SttParams) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.api_key_env)?;
        let url = format!(
            "{}?{}",
            cfg.base_url.trim_end_matches('/'),
            params.query_string()
        );

        let mut request = url.into_client_request().map_err(|e| {
            Error::Validation(format!("invalid STT URL: {e}"))
        })?;
        request.headers_mut().insert(
            "Authorization",
            format!("Token {api_key}").parse().map_err(|_| {
                Error::Auth("STT API key contains invalid header characters".into())
            })?,
        );

        let (ws, _resp) = connect_async(request).await.map_err(|e| {
            Error::ProviderTransient {
                provider: "stt".into(),
                message: format!("connect: {e}"),
            }
        })?;
        let (mut sink, mut stream) = ws.split();

        let (audio_tx, mut audio_rx) = mpsc::channel::<Upstream>(64);
        let (events_tx, events_rx) = mpsc::channel::<SttEvent>(64);

        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    up = audio_rx.recv() => match up {
                        Some(Upstream::Pcm(frame)) => {
                            if sink.send(Message::Binary(frame)).await.is_err() {
                                break;
                            }
                        }
                        // Finish or sender dropped: close the provider side.
                        Some(Upstream::Finish) | None => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    msg = stream.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = parse_provider_event(&text) {
                                if events_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::debug!(error = %e, "stt provider socket error");
                            break;
                        }
                    },
                }
            }
            // events_tx drops here; the relay observes the stream end.
        });

        Ok(Self {
            audio_tx,
            events_rx,
            pump,
        })
    }

    /// Forward one binary PCM frame upstream.
    pub async fn send_pcm(&self, frame: Vec<u8>) -> Result<()> {
        self.audio_tx
            .send(Upstream::Pcm(frame))
            .await
            .map_err(|_| Error::ProviderTransient {
                provider: "stt".into(),
                message: "provider connection closed".into(),
            })
    }

    /// Receive the next recognition event; `None` once the provider
    /// side is gone.
    pub async fn next_event(&mut self) -> Option<SttEvent> {
        self.events_rx.recv().await
    }

    /// Close the provider side. The pump flushes the close frame and
    /// exits; remaining queued audio is discarded.
    pub async fn close(self) {
        let _ = self.audio_tx.send(Upstream::Finish).await;
        // Bounded: the pump exits as soon as it sees Finish.
        let _ = tokio::time::timeout(std::time::Duration::from_millis(500), self.pump).await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider event parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse one provider JSON message into an [`SttEvent`].
///
/// Non-result messages (metadata, utterance-end markers, speech-started
/// pings) yield `None`.
fn parse_provider_event(text: &str) -> Option<SttEvent> {
    let json: Value = serde_json::from_str(text).ok()?;
    if json["type"].as_str() != Some("Results") {
        return None;
    }

    let alternative = &json["channel"]["alternatives"][0];
    let transcript = alternative["transcript"].as_str()?.to_string();
    let is_final = json["is_final"].as_bool().unwrap_or(false);

    let speaker_count = alternative["words"].as_array().map(|words| {
        let speakers: HashSet<u64> = words
            .iter()
            .filter_map(|w| w["speaker"].as_u64())
            .collect();
        speakers.len() as u32
    });

    Some(SttEvent {
        text: transcript,
        is_final,
        arrived_at: chrono::Utc::now(),
        speaker_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_final_result() {
        let raw = r#"{
            "type": "Results",
            "is_final": true,
            "channel": {"alternatives": [{"transcript": "hello world", "words": [
                {"word": "hello", "speaker": 0},
                {"word": "world", "speaker": 0}
            ]}]}
        }"#;
        let event = parse_provider_event(raw).unwrap();
        assert_eq!(event.text, "hello world");
        assert!(event.is_final);
        assert_eq!(event.speaker_count, Some(1));
    }

    #[test]
    fn parses_interim_with_two_speakers() {
        let raw = r#"{
            "type": "Results",
            "is_final": false,
            "channel": {"alternatives": [{"transcript": "two voices", "words": [
                {"word": "two", "speaker": 0},
                {"word": "voices", "speaker": 1}
            ]}]}
        }"#;
        let event = parse_provider_event(raw).unwrap();
        assert!(!event.is_final);
        assert_eq!(event.speaker_count, Some(2));
    }

    #[test]
    fn ignores_metadata_messages() {
        assert!(parse_provider_event(r#"{"type": "Metadata"}"#).is_none());
        assert!(parse_provider_event(r#"{"type": "UtteranceEnd"}"#).is_none());
        assert!(parse_provider_event("not json").is_none());
    }

    #[test]
    fn query_string_carries_stream_parameters() {
        let params = SttParams {
            language: "en".into(),
            model: "nova-2".into(),
            sample_rate: 16_000,
            endpointing_ms: 500,
            utterance_end_ms: 2000,
            interim_results: true,
            diarize: true,
        };
        let qs = params.query_string();
        assert!(qs.contains("endpointing=500"));
        assert!(qs.contains("utterance_end_ms=2000"));
        assert!(qs.contains("sample_rate=16000"));
        assert!(qs.contains("interim_results=true"));
    }
}
