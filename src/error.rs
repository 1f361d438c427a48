use thiserror::Error;

use crate::types::{PipelineStage, ProviderTag};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Missing or malformed input, reported before any stream opens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Source content is required")]
    MissingSourceContent,

    #[error("Article text is required")]
    MissingArticle,

    #[error("Revision instruction is required")]
    MissingInstruction,

    #[error("API key is required for {0}")]
    MissingApiKey(ProviderTag),

    #[error("Model ID is required")]
    MissingModel,

    #[error("Provider is required")]
    MissingProvider,

    #[error("Unsupported provider: {0}")]
    UnknownProvider(String),

    #[error("Review step is required")]
    MissingReviewStep,

    #[error("Unknown review step: {0}")]
    UnknownReviewStep(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// What went wrong inside a provider adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    MissingApiKey,
    MissingModel,
    NoMessages,
    /// Vendor needs at least one user/assistant turn besides the system prompt.
    NoConversation,
    /// The request could not be sent or its response could not be read.
    Request,
    /// The vendor answered with a non-success status.
    Status(u16),
    /// Failure after the stream was open.
    Stream,
}

/// Failure raised by a provider adapter, tagged with the vendor.
#[derive(Error, Debug)]
#[error("{provider}: {message}")]
pub struct ProviderError {
    pub provider: ProviderTag,
    pub kind: ProviderErrorKind,
    pub message: String,
    #[source]
    pub source: Option<BoxError>,
}

impl ProviderError {
    pub fn new(provider: ProviderTag, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// An error frame arrived, or the channel broke the framing contract.
    #[error("{0}")]
    StreamProtocol(String),

    #[error("Stage {stage} finished without any text")]
    EmptyResult { stage: PipelineStage },

    #[error("Another stage is still running")]
    Busy,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    #[error("Content extraction failed: {0}")]
    Extraction(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn is_validation(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
