//! # Inkflow
//!
//! Streaming multi-stage article writer: a draft, three ordered review passes
//! and instruction-driven revisions, over any supported LLM vendor.
//!
//! Every stage is one provider stream. The service side turns provider
//! fragments into a framed text channel; the client side decodes that channel
//! and drives a session through the stage state machine.
//!
//! ## Features
//!
//! - **Six vendors, one contract**: OpenAI, Anthropic, DeepSeek, GLM, MiniMax
//!   and Qwen behind a closed dispatcher
//! - **Framed streaming**: `data:` frames with exactly one `[DONE]` or
//!   `[ERROR]` terminator per stream
//! - **Stage pipeline**: generate (appends live), then content, style and
//!   detail reviews (each replaces the article), aborting on the first failure
//! - **Revisions** with an instruction log of applied and failed requests
//! - **Layout normalization**: heading repair, overlong heading and paragraph
//!   splitting, idempotent
//! - **HTTP service** (axum) and an in-process transport for the same pipeline
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use inkflow::client::LocalTransport;
//! use inkflow::controller::{DraftInput, ModelSelection, PipelineController};
//! use inkflow::{Dispatcher, ProviderTag, WritingService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = Arc::new(WritingService::new(Dispatcher::new(reqwest::Client::new())));
//!     let selection = ModelSelection::new(ProviderTag::DeepSeek, "deepseek-chat", "sk-...");
//!
//!     let mut controller = PipelineController::new(LocalTransport::new(service), selection);
//!     let article = controller
//!         .run(DraftInput::new("Notes from this week's incident review ..."))
//!         .await?;
//!
//!     println!("{}", article);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod frame;
pub mod layout;
pub mod logging;
pub mod prompt;
pub mod providers;
pub mod server;
pub mod service;
pub mod sse;
pub mod types;

pub use client::{HttpTransport, LocalTransport, PipelineClient, StageRequest, StageTransport};
pub use controller::{
    DraftInput, ModelSelection, PipelineController, PipelineEvent, RevisionOutcome, RevisionRecord,
    WritingSession,
};
pub use dispatch::Dispatcher;
pub use error::{PipelineError, ProviderError, ProviderErrorKind, Result, ValidationError};
pub use frame::Frame;
pub use layout::normalize;
pub use providers::{
    AnthropicAdapter, FragmentStream, OpenAiCompatibleAdapter, ProviderAdapter, ProviderEndpoints,
};
pub use service::{GenerateRequest, ReviewRequest, ReviseRequest, WritingService};
pub use types::{
    ArticleConfig, ArticleType, Audience, Message, PipelineStage, ProviderTag, ReviewStep, Role,
    StreamRequest, WritingStyle,
};
