//! HTTP surface of the writing service.
//!
//! Stage routes answer with a raw `text/event-stream` body of frames; any
//! failure before the stream opens is a JSON `{"error": ..}` body instead.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::fetch::SourceFetcher;
use crate::service::{FrameStream, GenerateRequest, ReviewRequest, ReviseRequest, WritingService};

/// Error reply body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FetchUrlRequest {
    url: String,
}

#[derive(Debug, Serialize)]
struct FetchUrlReply {
    content: String,
}

#[derive(Debug, Clone)]
pub struct AppState {
    service: Arc<WritingService>,
    fetcher: SourceFetcher,
}

impl AppState {
    pub fn new(service: Arc<WritingService>, fetcher: SourceFetcher) -> Self {
        Self { service, fetcher }
    }
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/generate", post(generate))
        .route("/api/review", post(review))
        .route("/api/revise", post(revise))
        .route("/api/fetch-url", post(fetch_url))
        .with_state(state)
}

/// Serve until the listener fails.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "writing service listening");
    }
    axum::serve(listener, router(state)).await
}

/// 400 for bad input, 422 for pages without content, 502 for upstream
/// failures, 500 for the rest.
pub fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
        PipelineError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Provider(_) | PipelineError::Http { .. } | PipelineError::Network { .. } => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: PipelineError) -> ApiError {
    let status = status_for(&err);
    warn!(status = status.as_u16(), error = %err, "request failed");
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    warn!(error = %rejection.body_text(), "rejected request body");
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: rejection.body_text(),
        }),
    )
}

fn event_stream(frames: FrameStream) -> Response {
    let body = Body::from_stream(frames.map(Ok::<_, Infallible>));
    (
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache"),
            (CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(bad_body)?;
    let frames = state.service.generate(request).await.map_err(api_error)?;
    Ok(event_stream(frames))
}

async fn review(
    State(state): State<AppState>,
    payload: Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(bad_body)?;
    let frames = state.service.review(request).await.map_err(api_error)?;
    Ok(event_stream(frames))
}

async fn revise(
    State(state): State<AppState>,
    payload: Result<Json<ReviseRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(bad_body)?;
    let frames = state.service.revise(request).await.map_err(api_error)?;
    Ok(event_stream(frames))
}

async fn fetch_url(
    State(state): State<AppState>,
    payload: Result<Json<FetchUrlRequest>, JsonRejection>,
) -> Result<Json<FetchUrlReply>, ApiError> {
    let Json(request) = payload.map_err(bad_body)?;
    let content = state.fetcher.fetch(&request.url).await.map_err(api_error)?;
    Ok(Json(FetchUrlReply { content }))
}
