//! Command line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::providers::ProviderEndpoints;
use crate::types::{ArticleConfig, ArticleType, Audience, ProviderTag, WritingStyle};

#[derive(Debug, Parser)]
#[command(name = "inkflow", version, about = "Draft, review and revise articles with any supported LLM vendor")]
pub struct Cli {
    /// Debug-level logging (RUST_LOG still wins).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// API key file.
    #[arg(long, global = true, env = "INKFLOW_CREDENTIALS")]
    pub credentials: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn credentials_path(&self) -> PathBuf {
        self.credentials
            .clone()
            .unwrap_or_else(default_credentials_path)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP writing service.
    Serve(ServeArgs),
    /// Run the whole pipeline from the terminal, article to stdout.
    Write(WriteArgs),
    /// Manage stored API keys.
    #[command(subcommand)]
    Keys(KeysCommand),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:3000")]
    pub listen: SocketAddr,

    /// Override a vendor base URL, as `<provider>=<url>`. Repeatable.
    #[arg(long = "base-url", value_parser = parse_endpoint)]
    pub base_urls: Vec<(ProviderTag, String)>,
}

#[derive(Debug, Args)]
pub struct WriteArgs {
    /// Source material file, or `-` for stdin.
    #[arg(long, conflicts_with = "url", required_unless_present = "url")]
    pub source: Option<PathBuf>,

    /// Fetch the source material from a web page instead.
    #[arg(long)]
    pub url: Option<String>,

    #[arg(long)]
    pub provider: ProviderTag,

    /// Model id; defaults to the vendor's usual model.
    #[arg(long)]
    pub model: Option<String>,

    /// API key; falls back to the key file.
    #[arg(long, env = "INKFLOW_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, value_enum, default_value_t)]
    pub article_type: ArticleType,

    #[arg(long, value_enum, default_value_t)]
    pub audience: Audience,

    #[arg(long, value_enum, default_value_t)]
    pub style: WritingStyle,

    #[arg(long, default_value = "2000-4000")]
    pub word_count: String,

    /// Extra requirements appended to the drafting prompt.
    #[arg(long)]
    pub extra: Option<String>,

    /// Base URL of a running writing service; runs in-process when absent.
    #[arg(long)]
    pub server: Option<String>,

    /// Skip the three review passes.
    #[arg(long)]
    pub no_review: bool,

    /// Revision instruction applied after the run. Repeatable, applied in order.
    #[arg(long)]
    pub revise: Vec<String>,

    /// Override a vendor base URL for in-process runs, as `<provider>=<url>`.
    #[arg(long = "base-url", value_parser = parse_endpoint)]
    pub base_urls: Vec<(ProviderTag, String)>,
}

impl WriteArgs {
    pub fn article_config(&self) -> ArticleConfig {
        ArticleConfig::default()
            .with_article_type(self.article_type)
            .with_audience(self.audience)
            .with_style(self.style)
            .with_word_count(self.word_count.clone())
            .with_extra_instructions(self.extra.clone().unwrap_or_default())
    }

    pub fn model_id(&self) -> String {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.provider.default_model())
            .to_string()
    }
}

#[derive(Debug, Subcommand)]
pub enum KeysCommand {
    /// Store a key; an empty key removes it.
    Set { provider: ProviderTag, key: String },
    /// Show which vendors have a key.
    List,
}

/// `~/.config/inkflow/keys.json`, or `inkflow-keys.json` when there is no home.
pub fn default_credentials_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home)
            .join(".config")
            .join("inkflow")
            .join("keys.json"),
        _ => PathBuf::from("inkflow-keys.json"),
    }
}

fn parse_endpoint(raw: &str) -> Result<(ProviderTag, String), String> {
    let (tag, url) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected <provider>=<url>, got {:?}", raw))?;
    let tag: ProviderTag = tag.parse().map_err(|e| format!("{}", e))?;
    let url = url.trim();
    if url.is_empty() {
        return Err(format!("missing URL for {}", tag));
    }
    Ok((tag, url.to_string()))
}

/// Default endpoints with the given overrides applied.
pub fn endpoints(overrides: &[(ProviderTag, String)]) -> ProviderEndpoints {
    overrides
        .iter()
        .fold(ProviderEndpoints::default(), |endpoints, (tag, url)| {
            endpoints.with(*tag, url.clone())
        })
}
