//! Server side of a stage: validate, build messages, dispatch, frame.

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dispatch::Dispatcher;
use crate::error::{Result, ValidationError};
use crate::frame::encode_fragments;
use crate::prompt;
use crate::types::{ArticleConfig, Message, ProviderTag, ReviewStep, StreamRequest};

/// Encoded frames, ready to be written to the channel.
pub type FrameStream = BoxStream<'static, String>;

/// Body of `POST /api/generate`.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateRequest {
    pub source_content: String,
    pub config: ArticleConfig,
    pub provider: Option<String>,
    pub model_id: String,
    pub api_key: String,
}

/// Body of `POST /api/review`.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewRequest {
    pub article: String,
    pub review_step: Option<String>,
    pub provider: Option<String>,
    pub model_id: String,
    pub api_key: String,
}

/// Body of `POST /api/revise`.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviseRequest {
    pub article: String,
    pub instruction: String,
    pub provider: Option<String>,
    pub model_id: String,
    pub api_key: String,
}

macro_rules! redacted_debug {
    ($ty:ident { $($field:ident),* }) => {
        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($ty))
                    $(.field(stringify!($field), &self.$field))*
                    .field("api_key", &"<redacted>")
                    .finish()
            }
        }
    };
}

redacted_debug!(GenerateRequest { config, provider, model_id });
redacted_debug!(ReviewRequest { review_step, provider, model_id });
redacted_debug!(ReviseRequest { instruction, provider, model_id });

/// Runs one stage per call against the dispatcher.
#[derive(Debug, Clone)]
pub struct WritingService {
    dispatcher: Dispatcher,
}

impl WritingService {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn generate(&self, request: GenerateRequest) -> Result<FrameStream> {
        if request.source_content.trim().is_empty() {
            return Err(ValidationError::MissingSourceContent.into());
        }
        let provider = credentials_for(request.provider.as_deref(), &request.api_key)?;
        let messages = prompt::generate_messages(&request.source_content, &request.config);
        info!(%provider, chars = request.source_content.chars().count(), "generate stage requested");
        self.open(provider, request.model_id, request.api_key, messages)
            .await
    }

    pub async fn review(&self, request: ReviewRequest) -> Result<FrameStream> {
        if request.article.trim().is_empty() {
            return Err(ValidationError::MissingArticle.into());
        }
        let step: ReviewStep = request
            .review_step
            .as_deref()
            .ok_or(ValidationError::MissingReviewStep)?
            .parse()?;
        let provider = credentials_for(request.provider.as_deref(), &request.api_key)?;
        let messages = prompt::review_messages(&request.article, step);
        info!(%provider, %step, "review stage requested");
        self.open(provider, request.model_id, request.api_key, messages)
            .await
    }

    pub async fn revise(&self, request: ReviseRequest) -> Result<FrameStream> {
        if request.article.trim().is_empty() {
            return Err(ValidationError::MissingArticle.into());
        }
        if request.instruction.trim().is_empty() {
            return Err(ValidationError::MissingInstruction.into());
        }
        let provider = credentials_for(request.provider.as_deref(), &request.api_key)?;
        let messages = prompt::revise_messages(&request.article, &request.instruction);
        info!(%provider, "revise stage requested");
        self.open(provider, request.model_id, request.api_key, messages)
            .await
    }

    /// A provider failure here is synchronous: nothing has been framed yet.
    async fn open(
        &self,
        provider: ProviderTag,
        model_id: String,
        api_key: String,
        messages: Vec<Message>,
    ) -> Result<FrameStream> {
        let request = StreamRequest {
            provider,
            model_id,
            api_key,
            messages,
        };
        let fragments = self.dispatcher.stream(&request).await?;
        Ok(encode_fragments(fragments).boxed())
    }
}

/// Unknown or missing vendors are validation failures, never a default vendor.
fn credentials_for(provider: Option<&str>, api_key: &str) -> Result<ProviderTag> {
    let provider: ProviderTag = provider.ok_or(ValidationError::MissingProvider)?.parse()?;
    if api_key.trim().is_empty() {
        return Err(ValidationError::MissingApiKey(provider).into());
    }
    Ok(provider)
}
