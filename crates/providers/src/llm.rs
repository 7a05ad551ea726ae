//! OpenAI-compatible chat adapter.
//!
//! Works with OpenAI, Azure-fronted proxies, vLLM, and any endpoint
//! following the chat completions contract. The dialogue controller
//! wraps every call in its own 20 s deadline, so the HTTP client
//! timeout here is only a backstop.

use serde_json::Value;

use candor_domain::config::LlmConfig;
use candor_domain::error::{Error, Result};

use crate::traits::{ChatMessage, ChatRequest, ChatResponse, ChatRole, LlmProvider};
use crate::util::{from_reqwest, from_status, resolve_api_key};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM adapter for any OpenAI-compatible chat completions endpoint.
pub struct OpenAiCompatLlm {
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatLlm {
    /// Create a new adapter from the LLM section of the config.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.api_key_env)?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| from_reqwest("llm", e))?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: cfg.model.clone(),
            client,
        })
    }

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();

        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
        });

        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }
}

fn msg_to_openai(msg: &ChatMessage) -> Value {
    let role = match msg.role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    };
    serde_json::json!({ "role": role, "content": msg.content })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LlmProvider impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatLlm {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(&req);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| from_reqwest("llm", e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| from_reqwest("llm", e))?;
        if !status.is_success() {
            return Err(from_status("llm", status.as_u16(), &text));
        }

        let json: Value = serde_json::from_str(&text)?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        if content.is_empty() {
            return Err(Error::ProviderTransient {
                provider: "llm".into(),
                message: "empty completion content".into(),
            });
        }
        let model = json["model"]
            .as_str()
            .unwrap_or(&self.default_model)
            .to_string();

        Ok(ChatResponse { content, model })
    }

    fn provider_id(&self) -> &str {
        "openai-compat"
    }
}
