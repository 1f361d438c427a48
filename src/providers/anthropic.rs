use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    check_preconditions, drive, request_error, status_error, FragmentStream, ProviderAdapter,
    UpstreamEvent,
};
use crate::error::{ProviderError, ProviderErrorKind};
use crate::sse::data_payload;
use crate::types::{Message, ProviderTag, Role};

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Adapter for the Anthropic Messages API.
///
/// The system message travels in the dedicated `system` field; the remaining
/// turns must not be empty.
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    http: Client,
    base_url: String,
}

impl AnthropicAdapter {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn provider(&self) -> ProviderTag {
        ProviderTag::Anthropic
    }

    async fn stream(
        &self,
        api_key: &str,
        model_id: &str,
        messages: &[Message],
    ) -> Result<FragmentStream, ProviderError> {
        check_preconditions(ProviderTag::Anthropic, api_key, model_id, messages)?;

        let body = request_body(model_id, messages)?;
        let url = format!("{}/v1/messages", self.base_url);
        debug!(provider = "anthropic", model = model_id, messages = messages.len(), "opening message stream");

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", api_key.trim())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(ProviderTag::Anthropic, e))?;

        if !resp.status().is_success() {
            return Err(status_error(ProviderTag::Anthropic, resp).await);
        }

        Ok(drive(ProviderTag::Anthropic, resp, parse_line))
    }
}

fn request_body(model_id: &str, messages: &[Message]) -> Result<Value, ProviderError> {
    let system = messages.iter().find(|m| m.role == Role::System);
    let conversation: Vec<&Message> = messages.iter().filter(|m| m.role != Role::System).collect();

    if conversation.is_empty() {
        return Err(ProviderError::new(
            ProviderTag::Anthropic,
            ProviderErrorKind::NoConversation,
            "At least one user or assistant message is required",
        ));
    }

    let mut body = json!({
        "model": model_id,
        "max_tokens": MAX_TOKENS,
        "messages": conversation,
        "stream": true,
    });
    if let Some(system) = system {
        body["system"] = json!(system.content);
    }
    Ok(body)
}

pub(crate) fn parse_line(line: &str) -> UpstreamEvent {
    let Some(payload) = data_payload(line) else {
        return UpstreamEvent::Skip;
    };
    let Ok(json) = serde_json::from_str::<Value>(payload.trim()) else {
        return UpstreamEvent::Skip;
    };

    match json.get("type").and_then(|t| t.as_str()) {
        Some("content_block_delta") => {
            let delta = &json["delta"];
            match (delta["type"].as_str(), delta["text"].as_str()) {
                (Some("text_delta"), Some(text)) if !text.is_empty() => {
                    UpstreamEvent::Text(text.to_string())
                }
                _ => UpstreamEvent::Skip,
            }
        }
        Some("message_stop") => UpstreamEvent::End,
        Some("error") => UpstreamEvent::Failed(
            json.pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown error")
                .to_string(),
        ),
        _ => UpstreamEvent::Skip,
    }
}
