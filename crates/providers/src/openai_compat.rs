//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Azure OpenAI, and any other endpoint that follows the
//! OpenAI chat completions contract. The harness only ever needs
//! text-in/text-out: no tools, no streaming, no embeddings.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rlm_domain::config::{AuthMode, ProviderConfig, ProviderKind};
use rlm_domain::message::{LmInput, Message, Role};
use serde_json::Value;

use crate::client::{with_deadline, LmCallError, LmCallResult, LmClient, Usage};

pub struct OpenAiCompatClient {
    id: String,
    base_url: String,
    auth_header: String,
    auth_prefix: String,
    auth_key: Option<String>,
    client: reqwest::Client,
    is_azure: bool,
}

impl OpenAiCompatClient {
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self, LmCallError> {
        let is_azure = cfg.kind == ProviderKind::AzureOpenai;

        let auth_header = cfg.auth.header.clone().unwrap_or_else(|| {
            if is_azure {
                "api-key".into()
            } else {
                "Authorization".into()
            }
        });
        let auth_prefix = cfg.auth.prefix.clone().unwrap_or_else(|| {
            if is_azure {
                String::new()
            } else {
                "Bearer ".into()
            }
        });

        let auth_key = match cfg.auth.mode {
            AuthMode::None => None,
            AuthMode::ApiKey => {
                let env_name = cfg.auth.env.clone().unwrap_or_default();
                Some(std::env::var(&env_name).map_err(|_| {
                    LmCallError::Transport(format!(
                        "credential env var '{env_name}' is not set for provider '{}'",
                        cfg.id
                    ))
                })?)
            }
        };

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LmCallError::Transport(e.to_string()))?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            auth_header,
            auth_prefix,
            auth_key,
            client,
            is_azure,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.post(url).header("Content-Type", "application/json");
        if let Some(key) = &self.auth_key {
            let value = format!("{}{}", self.auth_prefix, key);
            req = req.header(&self.auth_header, value);
        }
        req
    }

    fn chat_url(&self, model: &str) -> String {
        if self.is_azure {
            format!(
                "{}/openai/deployments/{}/chat/completions?api-version=2024-10-21",
                self.base_url, model
            )
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }

    fn build_body(&self, model: &str, input: &LmInput) -> Value {
        let messages: Vec<Value> = match input {
            LmInput::Prompt(text) => vec![serde_json::json!({"role": "user", "content": text})],
            LmInput::Messages(messages) => messages.iter().map(message_to_openai).collect(),
        };

        let mut body = serde_json::json!({
            "messages": messages,
            "stream": false,
        });
        if !self.is_azure {
            body["model"] = Value::String(model.to_string());
        }
        body
    }
}

fn message_to_openai(msg: &Message) -> Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    serde_json::json!({"role": role, "content": msg.content})
}

fn parse_chat_response(body: &Value) -> Result<(String, Option<String>, Option<Usage>), LmCallError> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| LmCallError::Remote("no choices in response".into()))?;

    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    let usage = body.get("usage").and_then(|u| {
        Some(Usage {
            prompt_tokens: u.get("prompt_tokens")?.as_u64()? as u32,
            completion_tokens: u.get("completion_tokens")?.as_u64()? as u32,
        })
    });

    Ok((content, finish_reason, usage))
}

#[async_trait]
impl LmClient for OpenAiCompatClient {
    async fn call(
        &self,
        model: &str,
        input: LmInput,
        deadline: Duration,
    ) -> Result<LmCallResult, LmCallError> {
        let url = self.chat_url(model);
        let body = self.build_body(model, &input);
        let started = Instant::now();

        tracing::debug!(provider = %self.id, %url, "openai_compat chat request");

        let result = with_deadline(deadline, async {
            let resp = self
                .authed_post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| LmCallError::Transport(e.to_string()))?;

            let status = resp.status();
            let text = resp
                .text()
                .await
                .map_err(|e| LmCallError::Transport(e.to_string()))?;

            if !status.is_success() {
                return Err(LmCallError::Remote(format!("HTTP {} - {text}", status.as_u16())));
            }

            let json: Value =
                serde_json::from_str(&text).map_err(|e| LmCallError::Remote(e.to_string()))?;
            let (content, finish_reason, usage) = parse_chat_response(&json)?;
            Ok((content, finish_reason, usage))
        })
        .await?;

        let (text, finish_reason, usage) = result;
        Ok(LmCallResult {
            text,
            usage,
            finish_reason,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}
