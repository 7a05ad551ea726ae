//! Frame detection adapter for the proctoring loop.
//!
//! Talks to an HTTP inference service. Each frame is tried against the
//! primary model; on failure the proctor retries the same frame against
//! the fast fallback model before counting a detector failure.

use serde::Deserialize;
use serde_json::Value;

use candor_domain::config::VisionConfig;
use candor_domain::error::{Error, Result};

use crate::traits::{Detection, DetectionLabel, FrameDetector};
use crate::util::{from_reqwest, from_status, resolve_api_key};

pub struct HttpDetector {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct WireBox {
    label: String,
    confidence: f32,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

impl HttpDetector {
    /// Build the primary detector from config.
    pub fn primary(cfg: &VisionConfig) -> Result<Self> {
        Self::with_model(cfg, cfg.primary_model.clone())
    }

    /// Build the fast fallback detector from config.
    pub fn fallback(cfg: &VisionConfig) -> Result<Self> {
        Self::with_model(cfg, cfg.fallback_model.clone())
    }

    fn with_model(cfg: &VisionConfig, model: String) -> Result<Self> {
        // Vision inference often runs co-located without auth; the key
        // is optional unlike the speech/LLM providers.
        let api_key = resolve_api_key(&cfg.api_key_env).ok();
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .map_err(|e| from_reqwest("vision", e))?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            client,
        })
    }
}

fn label_from_str(s: &str) -> DetectionLabel {
    match s {
        "person" | "face" => DetectionLabel::Person,
        "phone" | "cell phone" | "mobile phone" => DetectionLabel::Phone,
        _ => DetectionLabel::Other,
    }
}

#[async_trait::async_trait]
impl FrameDetector for HttpDetector {
    async fn detect(&self, frame_jpeg: &[u8]) -> Result<Vec<Detection>> {
        let url = format!("{}/detect?model={}", self.base_url, self.model);
        let mut req = self
            .client
            .post(&url)
            .header("Content-Type", "image/jpeg")
            .body(frame_jpeg.to_vec());
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| from_reqwest("vision", e))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| from_reqwest("vision", e))?;
        if !status.is_success() {
            return Err(from_status("vision", status.as_u16(), &text));
        }

        let json: Value = serde_json::from_str(&text)?;
        let boxes: Vec<WireBox> = serde_json::from_value(
            json.get("boxes").cloned().unwrap_or(Value::Array(vec![])),
        )
        .map_err(|e| Error::Internal(format!("vision: malformed boxes: {e}")))?;

        Ok(boxes
            .into_iter()
            .map(|b| Detection {
                label: label_from_str(&b.label),
                confidence: b.confidence,
                x: b.x,
                y: b.y,
                width: b.width,
                height: b.height,
            })
            .collect())
    }

    fn provider_id(&self) -> &str {
        "http-detector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_mapping() {
        assert_eq!(label_from_str("person"), DetectionLabel::Person);
        assert_eq!(label_from_str("cell phone"), DetectionLabel::Phone);
        assert_eq!(label_from_str("laptop"), DetectionLabel::Other);
    }

    #[test]
    fn detection_center() {
        let d = Detection {
            label: DetectionLabel::Person,
            confidence: 0.9,
            x: 0.2,
            y: 0.1,
            width: 0.4,
            height: 0.8,
        };
        assert!((d.center_x() - 0.4).abs() < f32::EPSILON);
    }
}
