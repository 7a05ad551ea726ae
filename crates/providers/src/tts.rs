//! HTTP text-to-speech adapter.
//!
//! The TTS cache layers on top of this; every call here is a real
//! synthesis request. Callers bound the call with the configured 15 s
//! deadline.

use candor_domain::config::TtsConfig;
use candor_domain::error::Result;

use crate::traits::TtsProvider;
use crate::util::{from_reqwest, from_status, resolve_api_key};

/// Adapter for an OpenAI-style `/audio/speech` endpoint.
pub struct HttpTts {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpTts {
    pub fn from_config(cfg: &TtsConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.api_key_env)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| from_reqwest("tts", e))?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[async_trait::async_trait]
impl TtsProvider for HttpTts {
    async fn synthesize(&self, text: &str, voice: &str, language: &str) -> Result<Vec<u8>> {
        let body = serde_json::json!({
            "model": "tts-1",
            "input": text,
            "voice": voice,
            "language": language,
            "response_format": "mp3",
        });

        let resp = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| from_reqwest("tts", e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(from_status("tts", status.as_u16(), &text));
        }

        let bytes = resp.bytes().await.map_err(|e| from_reqwest("tts", e))?;
        Ok(bytes.to_vec())
    }

    fn provider_id(&self) -> &str {
        "http-tts"
    }
}
