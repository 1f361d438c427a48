use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    check_preconditions, drive, request_error, status_error, upstream_error_message,
    FragmentStream, ProviderAdapter, UpstreamEvent,
};
use crate::error::ProviderError;
use crate::sse::data_payload;
use crate::types::{Message, ProviderTag};

/// Adapter for vendors speaking the OpenAI chat-completions streaming API.
///
/// OpenAI itself, DeepSeek, GLM, MiniMax and Qwen differ only by base URL.
/// Messages are sent verbatim, role for role.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleAdapter {
    provider: ProviderTag,
    http: Client,
    base_url: String,
}

impl OpenAiCompatibleAdapter {
    pub fn new(provider: ProviderTag, http: Client, base_url: impl Into<String>) -> Self {
        Self {
            provider,
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn provider(&self) -> ProviderTag {
        self.provider
    }

    async fn stream(
        &self,
        api_key: &str,
        model_id: &str,
        messages: &[Message],
    ) -> Result<FragmentStream, ProviderError> {
        check_preconditions(self.provider, api_key, model_id, messages)?;

        let body = json!({
            "model": model_id,
            "messages": messages,
            "stream": true,
        });

        let url = format!("{}/chat/completions", self.base_url);
        debug!(provider = %self.provider, model = model_id, messages = messages.len(), "opening chat completion stream");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(api_key.trim())
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(self.provider, e))?;

        if !resp.status().is_success() {
            return Err(status_error(self.provider, resp).await);
        }

        Ok(drive(self.provider, resp, parse_line))
    }
}

/// Interpret one line of a chat-completions SSE body.
pub(crate) fn parse_line(line: &str) -> UpstreamEvent {
    let Some(payload) = data_payload(line) else {
        return UpstreamEvent::Skip;
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return UpstreamEvent::Skip;
    }
    if payload == "[DONE]" {
        return UpstreamEvent::End;
    }

    let Ok(json) = serde_json::from_str::<Value>(payload) else {
        return UpstreamEvent::Skip;
    };

    if json.get("error").is_some() {
        return UpstreamEvent::Failed(
            upstream_error_message(payload).unwrap_or_else(|| "Unknown error".to_string()),
        );
    }

    match json
        .pointer("/choices/0/delta/content")
        .and_then(|v| v.as_str())
    {
        Some(text) if !text.is_empty() => UpstreamEvent::Text(text.to_string()),
        _ => UpstreamEvent::Skip,
    }
}
