//! Provider adapters: one per vendor, one narrow contract.
//!
//! `stream(api_key, model_id, messages)` either fails before anything is
//! sent upstream, or yields a lazy sequence of text fragments. Failures after
//! the stream is open arrive as the sequence's last item.

pub mod anthropic;
pub mod openai;

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderErrorKind};
use crate::sse::LineSplitter;
use crate::types::{Message, ProviderTag};

pub use anthropic::AnthropicAdapter;
pub use openai::OpenAiCompatibleAdapter;

/// Lazy fragment sequence. A terminal `Err` ends it.
pub type FragmentStream = BoxStream<'static, Result<String, ProviderError>>;

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> ProviderTag;

    async fn stream(
        &self,
        api_key: &str,
        model_id: &str,
        messages: &[Message],
    ) -> Result<FragmentStream, ProviderError>;
}

/// Fail-fast checks shared by every adapter, run before any network call.
pub fn check_preconditions(
    provider: ProviderTag,
    api_key: &str,
    model_id: &str,
    messages: &[Message],
) -> Result<(), ProviderError> {
    if api_key.trim().is_empty() {
        return Err(ProviderError::new(
            provider,
            ProviderErrorKind::MissingApiKey,
            format!("{} API key is required but was not provided", provider.display_name()),
        ));
    }
    if model_id.trim().is_empty() {
        return Err(ProviderError::new(
            provider,
            ProviderErrorKind::MissingModel,
            "Model ID is required but was not provided",
        ));
    }
    if messages.is_empty() {
        return Err(ProviderError::new(
            provider,
            ProviderErrorKind::NoMessages,
            "At least one message is required",
        ));
    }
    Ok(())
}

/// Upstream base URLs, overridable for gateways and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub openai: String,
    pub anthropic: String,
    pub deepseek: String,
    pub glm: String,
    pub minimax: String,
    pub qwen: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            openai: "https://api.openai.com/v1".to_string(),
            anthropic: "https://api.anthropic.com".to_string(),
            deepseek: "https://api.deepseek.com".to_string(),
            glm: "https://open.bigmodel.cn/api/coding/paas/v4".to_string(),
            minimax: "https://api.minimaxi.chat/v1".to_string(),
            qwen: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
        }
    }
}

impl ProviderEndpoints {
    pub fn get(&self, provider: ProviderTag) -> &str {
        match provider {
            ProviderTag::OpenAi => &self.openai,
            ProviderTag::Anthropic => &self.anthropic,
            ProviderTag::DeepSeek => &self.deepseek,
            ProviderTag::Glm => &self.glm,
            ProviderTag::MiniMax => &self.minimax,
            ProviderTag::Qwen => &self.qwen,
        }
    }

    /// Point one vendor at a different base URL.
    pub fn with(mut self, provider: ProviderTag, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        match provider {
            ProviderTag::OpenAi => self.openai = base_url,
            ProviderTag::Anthropic => self.anthropic = base_url,
            ProviderTag::DeepSeek => self.deepseek = base_url,
            ProviderTag::Glm => self.glm = base_url,
            ProviderTag::MiniMax => self.minimax = base_url,
            ProviderTag::Qwen => self.qwen = base_url,
        }
        self
    }

    /// Point every vendor at the same base URL.
    pub fn all(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        ProviderTag::ALL
            .into_iter()
            .fold(Self::default(), |endpoints, tag| endpoints.with(tag, base_url.clone()))
    }
}

/// What one line of a vendor's event stream means.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum UpstreamEvent {
    Text(String),
    Skip,
    End,
    Failed(String),
}

/// Drive a vendor SSE response, mapping each line through `parse`.
pub(crate) fn drive<F>(provider: ProviderTag, resp: reqwest::Response, parse: F) -> FragmentStream
where
    F: Fn(&str) -> UpstreamEvent + Send + 'static,
{
    stream! {
        let mut body = Box::pin(resp.bytes_stream());
        let mut lines = LineSplitter::new();
        let mut emitted = 0usize;

        loop {
            let pending = match body.next().await {
                Some(Ok(chunk)) => lines.push(&chunk),
                Some(Err(err)) => {
                    let message = format!("Streaming error: {}", err);
                    yield Err(ProviderError::new(provider, ProviderErrorKind::Stream, message).with_source(err));
                    return;
                }
                None => {
                    if let Some(line) = lines.finish() {
                        match parse(&line) {
                            UpstreamEvent::Text(text) => yield Ok(text),
                            UpstreamEvent::Failed(message) => {
                                yield Err(ProviderError::new(provider, ProviderErrorKind::Stream, format!("Streaming error: {}", message)));
                                return;
                            }
                            UpstreamEvent::End => {
                                debug!(%provider, fragments = emitted, "upstream stream finished");
                                return;
                            }
                            UpstreamEvent::Skip => {}
                        }
                    }
                    break;
                }
            };

            for line in pending {
                match parse(&line) {
                    UpstreamEvent::Text(text) => {
                        emitted += 1;
                        yield Ok(text);
                    }
                    UpstreamEvent::Skip => {}
                    UpstreamEvent::End => {
                        debug!(%provider, fragments = emitted, "upstream stream finished");
                        return;
                    }
                    UpstreamEvent::Failed(message) => {
                        yield Err(ProviderError::new(provider, ProviderErrorKind::Stream, format!("Streaming error: {}", message)));
                        return;
                    }
                }
            }
        }
        warn!(%provider, fragments = emitted, "upstream closed without an end marker");
        yield Err(ProviderError::new(
            provider,
            ProviderErrorKind::Stream,
            "Streaming error: stream ended before completion",
        ));
    }
    .boxed()
}

/// Wrap a send failure for the request that opens the stream.
pub(crate) fn request_error(provider: ProviderTag, err: reqwest::Error) -> ProviderError {
    let message = format!("Failed to create stream: {}", err);
    ProviderError::new(provider, ProviderErrorKind::Request, message).with_source(err)
}

/// Read the body of a non-success upstream response into a provider error.
pub(crate) async fn status_error(provider: ProviderTag, resp: reqwest::Response) -> ProviderError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let detail = upstream_error_message(&body).unwrap_or_else(|| body.trim().to_string());
    let message = if detail.is_empty() {
        format!("Failed to create stream: HTTP {}", status.as_u16())
    } else {
        format!("Failed to create stream: HTTP {}: {}", status.as_u16(), detail)
    };
    ProviderError::new(provider, ProviderErrorKind::Status(status.as_u16()), message)
}

/// Pull `error.message` (or a string `error`) out of a vendor JSON payload.
pub(crate) fn upstream_error_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = json.get("error")?;
    error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| error.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preconditions_are_distinct() {
        let msgs = vec![Message::user("hi")];
        let kind = |key: &str, model: &str, msgs: &[Message]| {
            check_preconditions(ProviderTag::OpenAi, key, model, msgs)
                .err()
                .map(|e| e.kind)
        };
        assert_eq!(kind("  ", "gpt-4o", &msgs), Some(ProviderErrorKind::MissingApiKey));
        assert_eq!(kind("sk", " ", &msgs), Some(ProviderErrorKind::MissingModel));
        assert_eq!(kind("sk", "gpt-4o", &[]), Some(ProviderErrorKind::NoMessages));
        assert_eq!(kind("sk", "gpt-4o", &msgs), None);
    }

    #[test]
    fn test_missing_key_message_names_vendor() {
        let err = check_preconditions(ProviderTag::Qwen, "", "qwen-plus", &[]).unwrap_err();
        assert_eq!(err.to_string(), "qwen: Qwen API key is required but was not provided");
    }

    #[test]
    fn test_endpoints_override() {
        let endpoints = ProviderEndpoints::default().with(ProviderTag::Glm, "http://localhost:9000/");
        assert_eq!(endpoints.get(ProviderTag::Glm), "http://localhost:9000");
        assert_eq!(endpoints.get(ProviderTag::OpenAi), "https://api.openai.com/v1");

        let all = ProviderEndpoints::all("http://gw");
        assert!(ProviderTag::ALL.iter().all(|tag| all.get(*tag) == "http://gw"));
    }

    #[test]
    fn test_upstream_error_message() {
        assert_eq!(
            upstream_error_message(r#"{"error":{"message":"bad key","type":"auth"}}"#),
            Some("bad key".to_string())
        );
        assert_eq!(upstream_error_message(r#"{"error":"overloaded"}"#), Some("overloaded".to_string()));
        assert_eq!(upstream_error_message("not json"), None);
    }
}
