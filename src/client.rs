use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::frame::decode_stream;
use crate::server::ErrorBody;
use crate::service::{GenerateRequest, ReviewRequest, ReviseRequest, WritingService};

/// Raw channel bytes of one stage, still framed.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// One stage call, as sent to the writing service.
#[derive(Debug, Clone)]
pub enum StageRequest {
    Generate(GenerateRequest),
    Review(ReviewRequest),
    Revise(ReviseRequest),
}

impl StageRequest {
    /// Route under the service's base URL.
    pub fn path(&self) -> &'static str {
        match self {
            StageRequest::Generate(_) => "/api/generate",
            StageRequest::Review(_) => "/api/review",
            StageRequest::Revise(_) => "/api/revise",
        }
    }
}

/// Opens the framed channel for a stage.
///
/// Failures before the channel opens (validation, provider errors raised
/// before the first fragment) are returned here; everything later arrives as
/// frames.
#[async_trait]
pub trait StageTransport: Send + Sync {
    async fn open(&self, request: StageRequest) -> Result<ByteStream>;
}

#[derive(Debug, Serialize)]
struct FetchBody<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct FetchReply {
    content: String,
}

/// Talks to a running writing service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask the service to fetch and extract a page.
    pub async fn fetch_source(&self, url: &str) -> Result<String> {
        let endpoint = format!("{}/api/fetch-url", self.base_url);
        let resp = self
            .http
            .post(&endpoint)
            .json(&FetchBody { url })
            .send()
            .await
            .map_err(|source| PipelineError::Network {
                context: format!("Failed to reach writing service at {}", endpoint),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(error_response(resp).await);
        }

        let reply: FetchReply = resp.json().await.map_err(|source| PipelineError::Network {
            context: "Failed to read fetch-url response".to_string(),
            source,
        })?;
        Ok(reply.content)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ByteStream> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "opening stage stream");

        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| PipelineError::Network {
                context: format!("Failed to reach writing service at {}", url),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(error_response(resp).await);
        }

        Ok(resp
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|source| PipelineError::Network {
                    context: "Stream read failed".to_string(),
                    source,
                })
            })
            .boxed())
    }
}

/// Turn a non-success reply into an error, preferring the `{"error": ..}` body.
async fn error_response(resp: reqwest::Response) -> PipelineError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body.error,
        Err(_) if text.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string(),
        Err(_) => text,
    };
    PipelineError::Http {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl StageTransport for HttpTransport {
    async fn open(&self, request: StageRequest) -> Result<ByteStream> {
        let path = request.path();
        match &request {
            StageRequest::Generate(body) => self.post(path, body).await,
            StageRequest::Review(body) => self.post(path, body).await,
            StageRequest::Revise(body) => self.post(path, body).await,
        }
    }
}

/// Runs stages in-process against a [`WritingService`], still through the
/// frame codec.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    service: Arc<WritingService>,
}

impl LocalTransport {
    pub fn new(service: Arc<WritingService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl StageTransport for LocalTransport {
    async fn open(&self, request: StageRequest) -> Result<ByteStream> {
        let frames = match request {
            StageRequest::Generate(body) => self.service.generate(body).await?,
            StageRequest::Review(body) => self.service.review(body).await?,
            StageRequest::Revise(body) => self.service.revise(body).await?,
        };
        Ok(frames.map(|frame| Ok(Bytes::from(frame))).boxed())
    }
}

/// Client side of a stage: opens the channel and decodes its frames.
#[derive(Debug, Clone)]
pub struct PipelineClient<T> {
    transport: T,
}

impl<T: StageTransport> PipelineClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Stream one stage to its terminal frame.
    ///
    /// `on_fragment` receives each fragment together with the text accumulated
    /// so far. Returns the full stage output; an `[ERROR]` frame or a channel
    /// that closes early is an error, after the fragments that preceded it were
    /// delivered.
    pub async fn stream_stage<F>(&self, request: StageRequest, mut on_fragment: F) -> Result<String>
    where
        F: FnMut(&str, &str),
    {
        let path = request.path();
        let bytes = self.transport.open(request).await?;
        let mut fragments = Box::pin(decode_stream(bytes));

        let mut text = String::new();
        let mut count = 0usize;
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            text.push_str(&fragment);
            count += 1;
            on_fragment(&fragment, &text);
        }

        debug!(path, fragments = count, chars = text.chars().count(), "stage stream finished");
        Ok(text)
    }
}
