//! Stage pipeline controller.
//!
//! Drives one writing session through
//! `Idle → Generating → Reviewing(content) → Reviewing(style) → Reviewing(detail) → Idle`,
//! plus the independent `Idle → Revising → Idle` loop. At most one stage is
//! active at a time; any failure aborts the run and returns to idle.

use std::fmt;

use tracing::{info, warn};

use crate::client::{PipelineClient, StageRequest, StageTransport};
use crate::error::{PipelineError, Result, ValidationError};
use crate::layout;
use crate::service::{GenerateRequest, ReviewRequest, ReviseRequest};
use crate::types::{ArticleConfig, PipelineStage, ProviderTag, ReviewStep};

/// Vendor, model and resolved key used for every stage of a session.
#[derive(Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub provider: ProviderTag,
    pub model_id: String,
    pub api_key: String,
}

impl ModelSelection {
    pub fn new(provider: ProviderTag, model_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSelection")
            .field("provider", &self.provider)
            .field("model_id", &self.model_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Input to a full pipeline run.
#[derive(Debug, Clone, Default)]
pub struct DraftInput {
    pub source_content: String,
    pub config: ArticleConfig,
}

impl DraftInput {
    pub fn new(source_content: impl Into<String>) -> Self {
        Self {
            source_content: source_content.into(),
            config: ArticleConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ArticleConfig) -> Self {
        self.config = config;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionOutcome {
    Applied,
    Failed(String),
    /// Sent before any article existed; later drafts follow it.
    Pending,
}

/// One entry of the instruction log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRecord {
    pub instruction: String,
    pub outcome: RevisionOutcome,
}

/// Session-scoped state: the article buffer, the active stage and the
/// instruction log.
#[derive(Debug, Clone, Default)]
pub struct WritingSession {
    article: String,
    stage: Option<PipelineStage>,
    revisions: Vec<RevisionRecord>,
    last_error: Option<String>,
}

impl WritingSession {
    pub fn article(&self) -> &str {
        &self.article
    }

    /// `None` when idle.
    pub fn stage(&self) -> Option<PipelineStage> {
        self.stage
    }

    pub fn revisions(&self) -> &[RevisionRecord] {
        &self.revisions
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

/// Progress reported to the caller while a run is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent<'a> {
    StageStarted(PipelineStage),
    /// The visible article changed: appended to while generating, replaced
    /// by the partial rewrite during review and revision.
    ArticleUpdated {
        stage: PipelineStage,
        article: &'a str,
    },
    StageCompleted(PipelineStage),
    Normalized,
    Failed {
        stage: PipelineStage,
        message: String,
    },
}

/// Runs the writing pipeline for a single session.
pub struct PipelineController<T> {
    client: PipelineClient<T>,
    selection: ModelSelection,
    auto_review: bool,
    session: WritingSession,
}

impl<T> fmt::Debug for PipelineController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineController")
            .field("selection", &self.selection)
            .field("auto_review", &self.auto_review)
            .field("stage", &self.session.stage)
            .field("article_chars", &self.session.article.chars().count())
            .field("revisions", &self.session.revisions.len())
            .finish()
    }
}

impl<T: StageTransport> PipelineController<T> {
    pub fn new(transport: T, selection: ModelSelection) -> Self {
        Self {
            client: PipelineClient::new(transport),
            selection,
            auto_review: true,
            session: WritingSession::default(),
        }
    }

    /// Skip the review passes; the draft is normalized right after generation.
    pub fn with_auto_review(mut self, enabled: bool) -> Self {
        self.auto_review = enabled;
        self
    }

    pub fn selection(&self) -> &ModelSelection {
        &self.selection
    }

    /// Switch vendor, model or key for subsequent stages.
    pub fn set_selection(&mut self, selection: ModelSelection) -> Result<()> {
        self.ensure_idle()?;
        self.selection = selection;
        Ok(())
    }

    pub fn session(&self) -> &WritingSession {
        &self.session
    }

    pub fn article(&self) -> &str {
        &self.session.article
    }

    pub fn stage(&self) -> Option<PipelineStage> {
        self.session.stage
    }

    pub fn revisions(&self) -> &[RevisionRecord] {
        &self.session.revisions
    }

    pub fn is_busy(&self) -> bool {
        self.session.stage.is_some()
    }

    /// Return to idle after a run future was dropped mid-stage.
    pub fn abort(&mut self) {
        if let Some(stage) = self.session.stage.take() {
            warn!(%stage, "stage aborted");
        }
    }

    /// Replace the article buffer, e.g. after a manual edit.
    pub fn set_article(&mut self, article: impl Into<String>) -> Result<()> {
        self.ensure_idle()?;
        self.session.article = article.into();
        Ok(())
    }

    /// Draft and review an article. Returns the committed, normalized text.
    pub async fn run(&mut self, input: DraftInput) -> Result<String> {
        self.run_with_events(input, |_| {}).await
    }

    /// Like [`run`](Self::run), reporting progress through `on_event`.
    pub async fn run_with_events<F>(&mut self, input: DraftInput, mut on_event: F) -> Result<String>
    where
        F: FnMut(PipelineEvent<'_>),
    {
        self.ensure_idle()?;
        if input.source_content.trim().is_empty() {
            return Err(ValidationError::MissingSourceContent.into());
        }
        self.ensure_credentials()?;

        self.session.last_error = None;
        self.session.article.clear();
        info!(
            provider = %self.selection.provider,
            model = %self.selection.model_id,
            auto_review = self.auto_review,
            "pipeline run started"
        );

        let result = self.run_stages(input, &mut on_event).await;
        match result {
            Ok(()) => {
                self.session.stage = None;
                self.apply_layout(&mut on_event);
                info!(chars = self.session.article.chars().count(), "pipeline run finished");
                Ok(self.session.article.clone())
            }
            Err(err) => Err(self.fail(err, &mut on_event)),
        }
    }

    async fn run_stages<F>(&mut self, input: DraftInput, on_event: &mut F) -> Result<()>
    where
        F: FnMut(PipelineEvent<'_>),
    {
        let request = StageRequest::Generate(GenerateRequest {
            source_content: input.source_content,
            config: self.draft_config(input.config),
            provider: Some(self.selection.provider.to_string()),
            model_id: self.selection.model_id.clone(),
            api_key: self.selection.api_key.clone(),
        });
        let mut article = self
            .stream_stage(PipelineStage::Generating, request, on_event)
            .await?;

        if !self.auto_review {
            return Ok(());
        }

        for step in ReviewStep::SEQUENCE {
            let request = self.review_request(article, step);
            article = self
                .stream_stage(PipelineStage::Reviewing(step), request, on_event)
                .await?;
        }
        Ok(())
    }

    /// Every logged instruction, one per line, after the configured extras.
    fn draft_config(&self, mut config: ArticleConfig) -> ArticleConfig {
        let extra = std::iter::once(config.extra_instructions.trim())
            .chain(self.session.revisions.iter().map(|r| r.instruction.as_str()))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        config.extra_instructions = extra;
        config
    }

    fn review_request(&self, article: String, step: ReviewStep) -> StageRequest {
        StageRequest::Review(ReviewRequest {
            article,
            review_step: Some(step.to_string()),
            provider: Some(self.selection.provider.to_string()),
            model_id: self.selection.model_id.clone(),
            api_key: self.selection.api_key.clone(),
        })
    }

    /// Run a single review pass over the current article.
    pub async fn review(&mut self, step: ReviewStep) -> Result<String> {
        self.review_with_events(step, |_| {}).await
    }

    /// Like [`review`](Self::review), reporting progress through `on_event`.
    pub async fn review_with_events<F>(&mut self, step: ReviewStep, mut on_event: F) -> Result<String>
    where
        F: FnMut(PipelineEvent<'_>),
    {
        self.ensure_idle()?;
        if self.session.article.trim().is_empty() {
            return Err(ValidationError::MissingArticle.into());
        }
        self.ensure_credentials()?;

        self.session.last_error = None;
        let request = self.review_request(self.session.article.clone(), step);
        let result = self
            .stream_stage(PipelineStage::Reviewing(step), request, &mut on_event)
            .await;
        match result {
            Ok(_) => {
                self.session.stage = None;
                self.apply_layout(&mut on_event);
                Ok(self.session.article.clone())
            }
            Err(err) => Err(self.fail(err, &mut on_event)),
        }
    }

    /// Rewrite the article according to a free-text instruction.
    pub async fn revise(&mut self, instruction: &str) -> Result<String> {
        self.revise_with_events(instruction, |_| {}).await
    }

    /// Like [`revise`](Self::revise), reporting progress through `on_event`.
    ///
    /// Success and stage failures are both recorded in the instruction log;
    /// input validation failures are not. Without an article the instruction
    /// is logged as pending and no stage runs.
    pub async fn revise_with_events<F>(&mut self, instruction: &str, mut on_event: F) -> Result<String>
    where
        F: FnMut(PipelineEvent<'_>),
    {
        self.ensure_idle()?;
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(ValidationError::MissingInstruction.into());
        }
        if self.session.article.trim().is_empty() {
            info!(pending = self.session.revisions.len() + 1, "instruction kept for the next draft");
            self.session.revisions.push(RevisionRecord {
                instruction: instruction.to_string(),
                outcome: RevisionOutcome::Pending,
            });
            return Ok(self.session.article.clone());
        }
        self.ensure_credentials()?;

        self.session.last_error = None;
        let request = StageRequest::Revise(ReviseRequest {
            article: self.session.article.clone(),
            instruction: instruction.to_string(),
            provider: Some(self.selection.provider.to_string()),
            model_id: self.selection.model_id.clone(),
            api_key: self.selection.api_key.clone(),
        });

        let result = self
            .stream_stage(PipelineStage::Revising, request, &mut on_event)
            .await;
        match result {
            Ok(_) => {
                self.session.stage = None;
                self.session.revisions.push(RevisionRecord {
                    instruction: instruction.to_string(),
                    outcome: RevisionOutcome::Applied,
                });
                self.apply_layout(&mut on_event);
                Ok(self.session.article.clone())
            }
            Err(err) => {
                self.session.revisions.push(RevisionRecord {
                    instruction: instruction.to_string(),
                    outcome: RevisionOutcome::Failed(err.to_string()),
                });
                Err(self.fail(err, &mut on_event))
            }
        }
    }

    /// Apply the layout normalizer to the current article, without a stream.
    pub fn format(&mut self) -> Result<&str> {
        self.ensure_idle()?;
        self.session.article = layout::normalize(&self.session.article);
        Ok(&self.session.article)
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.session.stage {
            Some(_) => Err(PipelineError::Busy),
            None => Ok(()),
        }
    }

    fn ensure_credentials(&self) -> Result<()> {
        if self.selection.api_key.trim().is_empty() {
            return Err(ValidationError::MissingApiKey(self.selection.provider).into());
        }
        Ok(())
    }

    /// Stream one stage into the article buffer.
    ///
    /// Generation appends; review and revision replace the buffer with the
    /// partial rewrite. A failed rewrite restores the text it started from;
    /// a failed draft keeps what had arrived.
    async fn stream_stage<F>(
        &mut self,
        stage: PipelineStage,
        request: StageRequest,
        on_event: &mut F,
    ) -> Result<String>
    where
        F: FnMut(PipelineEvent<'_>),
    {
        self.session.stage = Some(stage);
        info!(%stage, "stage started");
        on_event(PipelineEvent::StageStarted(stage));

        let committed = self.session.article.clone();
        let article = &mut self.session.article;
        let result = self
            .client
            .stream_stage(request, |fragment, so_far| {
                if stage.appends() {
                    article.push_str(fragment);
                } else {
                    article.clear();
                    article.push_str(so_far);
                }
                on_event(PipelineEvent::ArticleUpdated {
                    stage,
                    article: article.as_str(),
                });
            })
            .await
            .and_then(|text| {
                if text.trim().is_empty() {
                    Err(PipelineError::EmptyResult { stage })
                } else {
                    Ok(text)
                }
            });

        match result {
            Ok(text) => {
                info!(%stage, chars = text.chars().count(), "stage completed");
                on_event(PipelineEvent::StageCompleted(stage));
                Ok(text)
            }
            Err(err) => {
                if !stage.appends() {
                    self.session.article = committed;
                }
                Err(err)
            }
        }
    }

    fn apply_layout<F>(&mut self, on_event: &mut F)
    where
        F: FnMut(PipelineEvent<'_>),
    {
        self.session.article = layout::normalize(&self.session.article);
        on_event(PipelineEvent::Normalized);
    }

    /// Record a stage failure and return to idle.
    fn fail<F>(&mut self, err: PipelineError, on_event: &mut F) -> PipelineError
    where
        F: FnMut(PipelineEvent<'_>),
    {
        let stage = self.session.stage.take();
        let message = err.to_string();
        warn!(stage = ?stage, error = %message, "pipeline stage failed");
        self.session.last_error = Some(message.clone());
        if let Some(stage) = stage {
            on_event(PipelineEvent::Failed { stage, message });
        }
        err
    }
}
