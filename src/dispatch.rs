use std::sync::Arc;

use reqwest::Client;
use tracing::info;

use crate::error::ProviderError;
use crate::providers::{
    AnthropicAdapter, FragmentStream, OpenAiCompatibleAdapter, ProviderAdapter, ProviderEndpoints,
};
use crate::types::{ProviderTag, StreamRequest};

/// Routes a request to exactly one adapter.
///
/// Every vendor has a fixed slot; a slot's adapter can be swapped (tests,
/// gateways) but the set of vendors cannot grow at runtime. No retries and no
/// fallback to another vendor.
#[derive(Clone)]
pub struct Dispatcher {
    openai: Arc<dyn ProviderAdapter>,
    anthropic: Arc<dyn ProviderAdapter>,
    deepseek: Arc<dyn ProviderAdapter>,
    glm: Arc<dyn ProviderAdapter>,
    minimax: Arc<dyn ProviderAdapter>,
    qwen: Arc<dyn ProviderAdapter>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("providers", &ProviderTag::ALL)
            .finish()
    }
}

impl Dispatcher {
    /// Real vendor adapters at their default endpoints.
    pub fn new(http: Client) -> Self {
        Self::with_endpoints(http, &ProviderEndpoints::default())
    }

    pub fn with_endpoints(http: Client, endpoints: &ProviderEndpoints) -> Self {
        let compatible = |tag: ProviderTag| -> Arc<dyn ProviderAdapter> {
            Arc::new(OpenAiCompatibleAdapter::new(tag, http.clone(), endpoints.get(tag)))
        };
        Self {
            openai: compatible(ProviderTag::OpenAi),
            anthropic: Arc::new(AnthropicAdapter::new(
                http.clone(),
                endpoints.get(ProviderTag::Anthropic),
            )),
            deepseek: compatible(ProviderTag::DeepSeek),
            glm: compatible(ProviderTag::Glm),
            minimax: compatible(ProviderTag::MiniMax),
            qwen: compatible(ProviderTag::Qwen),
        }
    }

    /// Replace the adapter in `adapter.provider()`'s slot.
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        let slot = match adapter.provider() {
            ProviderTag::OpenAi => &mut self.openai,
            ProviderTag::Anthropic => &mut self.anthropic,
            ProviderTag::DeepSeek => &mut self.deepseek,
            ProviderTag::Glm => &mut self.glm,
            ProviderTag::MiniMax => &mut self.minimax,
            ProviderTag::Qwen => &mut self.qwen,
        };
        *slot = adapter;
        self
    }

    pub fn adapter(&self, provider: ProviderTag) -> &dyn ProviderAdapter {
        match provider {
            ProviderTag::OpenAi => self.openai.as_ref(),
            ProviderTag::Anthropic => self.anthropic.as_ref(),
            ProviderTag::DeepSeek => self.deepseek.as_ref(),
            ProviderTag::Glm => self.glm.as_ref(),
            ProviderTag::MiniMax => self.minimax.as_ref(),
            ProviderTag::Qwen => self.qwen.as_ref(),
        }
    }

    /// Open a fragment stream with the adapter selected by `request.provider`.
    pub async fn stream(&self, request: &StreamRequest) -> Result<FragmentStream, ProviderError> {
        info!(provider = %request.provider, model = %request.model_id, "dispatching stream request");
        self.adapter(request.provider)
            .stream(&request.api_key, &request.model_id, &request.messages)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;
    use crate::types::Message;
    use async_trait::async_trait;
    use futures::{stream, StreamExt};

    struct Echo(ProviderTag);

    #[async_trait]
    impl ProviderAdapter for Echo {
        fn provider(&self) -> ProviderTag {
            self.0
        }

        async fn stream(
            &self,
            _api_key: &str,
            model_id: &str,
            _messages: &[Message],
        ) -> Result<FragmentStream, ProviderError> {
            Ok(stream::iter(vec![Ok(format!("{}:{}", self.0, model_id))]).boxed())
        }
    }

    fn request(provider: ProviderTag, api_key: &str) -> StreamRequest {
        StreamRequest {
            provider,
            model_id: "m".into(),
            api_key: api_key.into(),
            messages: vec![Message::user("hi")],
        }
    }

    #[tokio::test]
    async fn test_routes_to_selected_slot_only() {
        let dispatcher = Dispatcher::new(Client::new())
            .with_adapter(Arc::new(Echo(ProviderTag::Glm)))
            .with_adapter(Arc::new(Echo(ProviderTag::Qwen)));

        let out: Vec<_> = dispatcher
            .stream(&request(ProviderTag::Qwen, "k"))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "qwen:m");
        assert_eq!(dispatcher.adapter(ProviderTag::Glm).provider(), ProviderTag::Glm);
    }

    #[tokio::test]
    async fn test_real_adapters_fail_fast_without_key() {
        let dispatcher = Dispatcher::new(Client::new());
        for tag in ProviderTag::ALL {
            assert_eq!(dispatcher.adapter(tag).provider(), tag);
            let err = match dispatcher.stream(&request(tag, " ")).await {
                Err(err) => err,
                Ok(_) => panic!("expected failure for {}", tag),
            };
            assert_eq!(err.provider, tag);
            assert_eq!(err.kind, ProviderErrorKind::MissingApiKey);
        }
    }
}
