use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Role of a message in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One chat message. A conversation holds at most one system message, first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Supported LLM vendors. Closed set: dispatch is an exhaustive match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTag {
    OpenAi,
    Anthropic,
    DeepSeek,
    Glm,
    MiniMax,
    Qwen,
}

impl ProviderTag {
    pub const ALL: [ProviderTag; 6] = [
        ProviderTag::OpenAi,
        ProviderTag::Anthropic,
        ProviderTag::DeepSeek,
        ProviderTag::Glm,
        ProviderTag::MiniMax,
        ProviderTag::Qwen,
    ];

    /// Wire name, as used in request bodies and the credential file.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderTag::OpenAi => "openai",
            ProviderTag::Anthropic => "anthropic",
            ProviderTag::DeepSeek => "deepseek",
            ProviderTag::Glm => "glm",
            ProviderTag::MiniMax => "minimax",
            ProviderTag::Qwen => "qwen",
        }
    }

    /// Human-readable vendor name used in error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderTag::OpenAi => "OpenAI",
            ProviderTag::Anthropic => "Anthropic",
            ProviderTag::DeepSeek => "DeepSeek",
            ProviderTag::Glm => "GLM",
            ProviderTag::MiniMax => "MiniMax",
            ProviderTag::Qwen => "Qwen",
        }
    }

    /// Model preselected by front ends when the user switches vendor.
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderTag::OpenAi => "gpt-4o",
            ProviderTag::Anthropic => "claude-sonnet-4-5-20250514",
            ProviderTag::DeepSeek => "deepseek-chat",
            ProviderTag::Glm => "glm-4.7",
            ProviderTag::MiniMax => "MiniMax-M1",
            ProviderTag::Qwen => "qwen-plus",
        }
    }
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderTag {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        if wanted.is_empty() {
            return Err(ValidationError::MissingProvider);
        }
        ProviderTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == wanted)
            .ok_or_else(|| ValidationError::UnknownProvider(s.trim().to_string()))
    }
}

/// Everything one provider call needs.
///
/// `api_key` and `model_id` come from the caller and are never defaulted here.
#[derive(Clone)]
pub struct StreamRequest {
    pub provider: ProviderTag,
    pub model_id: String,
    pub api_key: String,
    pub messages: Vec<Message>,
}

impl fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRequest")
            .field("provider", &self.provider)
            .field("model_id", &self.model_id)
            .field("api_key", &"<redacted>")
            .field("messages", &self.messages.len())
            .finish()
    }
}

/// Review passes, in the fixed order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStep {
    Content,
    Style,
    Detail,
}

impl ReviewStep {
    pub const SEQUENCE: [ReviewStep; 3] = [ReviewStep::Content, ReviewStep::Style, ReviewStep::Detail];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStep::Content => "content",
            ReviewStep::Style => "style",
            ReviewStep::Detail => "detail",
        }
    }
}

impl fmt::Display for ReviewStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStep {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" => Err(ValidationError::MissingReviewStep),
            "content" => Ok(ReviewStep::Content),
            "style" => Ok(ReviewStep::Style),
            "detail" => Ok(ReviewStep::Detail),
            _ => Err(ValidationError::UnknownReviewStep(s.trim().to_string())),
        }
    }
}

/// The stage currently holding the (single) open stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "stage", content = "step")]
pub enum PipelineStage {
    Generating,
    Reviewing(ReviewStep),
    Revising,
}

impl PipelineStage {
    /// Generation reveals text progressively; every other stage rewrites.
    pub fn appends(&self) -> bool {
        matches!(self, PipelineStage::Generating)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Generating => f.write_str("generating"),
            PipelineStage::Reviewing(step) => write!(f, "reviewing({})", step),
            PipelineStage::Revising => f.write_str("revising"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ArticleType {
    #[default]
    Wechat,
    Blog,
    Newsletter,
    Tutorial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Tech,
    Pm,
    Startup,
    #[default]
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WritingStyle {
    #[default]
    Casual,
    Professional,
    Humorous,
}

/// Parameters for the drafting stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArticleConfig {
    pub article_type: ArticleType,
    pub audience: Audience,
    pub style: WritingStyle,
    /// Target length range, e.g. `"2000-4000"`.
    pub word_count: String,
    pub extra_instructions: String,
}

impl Default for ArticleConfig {
    fn default() -> Self {
        Self {
            article_type: ArticleType::default(),
            audience: Audience::default(),
            style: WritingStyle::default(),
            word_count: "2000-4000".to_string(),
            extra_instructions: String::new(),
        }
    }
}

impl ArticleConfig {
    pub fn with_article_type(mut self, article_type: ArticleType) -> Self {
        self.article_type = article_type;
        self
    }

    pub fn with_audience(mut self, audience: Audience) -> Self {
        self.audience = audience;
        self
    }

    pub fn with_style(mut self, style: WritingStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_word_count(mut self, word_count: impl Into<String>) -> Self {
        self.word_count = word_count.into();
        self
    }

    pub fn with_extra_instructions(mut self, extra: impl Into<String>) -> Self {
        self.extra_instructions = extra.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_tag_parse() {
        assert_eq!("openai".parse::<ProviderTag>().unwrap(), ProviderTag::OpenAi);
        assert_eq!(" MiniMax ".parse::<ProviderTag>().unwrap(), ProviderTag::MiniMax);
        assert!(matches!(
            "".parse::<ProviderTag>(),
            Err(ValidationError::MissingProvider)
        ));
        assert!(matches!(
            "mistral".parse::<ProviderTag>(),
            Err(ValidationError::UnknownProvider(name)) if name == "mistral"
        ));
    }

    #[test]
    fn test_provider_tag_serde_names() {
        for tag in ProviderTag::ALL {
            let json = serde_json::to_string(&tag).unwrap();
            assert_eq!(json, format!("\"{}\"", tag.as_str()));
        }
    }

    #[test]
    fn test_stream_request_debug_redacts_key() {
        let request = StreamRequest {
            provider: ProviderTag::Qwen,
            model_id: "qwen-plus".into(),
            api_key: "sk-secret".into(),
            messages: vec![Message::user("hi")],
        };
        let debug = format!("{:?}", request);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_article_config_camel_case_defaults() {
        let config: ArticleConfig =
            serde_json::from_str(r#"{"articleType":"blog","wordCount":"800"}"#).unwrap();
        assert_eq!(config.article_type, ArticleType::Blog);
        assert_eq!(config.word_count, "800");
        assert_eq!(config.audience, Audience::General);
        assert_eq!(config.style, WritingStyle::Casual);
        assert!(config.extra_instructions.is_empty());
    }

    #[test]
    fn test_stage_append_mode() {
        assert!(PipelineStage::Generating.appends());
        assert!(!PipelineStage::Reviewing(ReviewStep::Style).appends());
        assert!(!PipelineStage::Revising.appends());
        assert_eq!(
            PipelineStage::Reviewing(ReviewStep::Detail).to_string(),
            "reviewing(detail)"
        );
    }
}
