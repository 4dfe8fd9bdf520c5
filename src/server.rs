//! HTTP server for the relay, the dashboard UI and health probes.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Service descriptor |
//! | `GET`  | `/api/webhooks/ingest` | Same descriptor, for relay probes |
//! | `POST` | `/api/webhooks/ingest` | Ingest one relay event (Bearer auth) |
//! | `POST` | `/api/ask` | Complete answer with sources |
//! | `POST` | `/api/chat` | Streamed `text/plain` answer, no sources |
//! | `GET`  | `/api/bridges/{id}/stats` | Totals, per-platform counts, latest messages |
//! | `GET`  | `/api/bridges/{id}/messages` | Paginated history (`page`, `pageSize`) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "forbidden", "message": "invalid token or bridge not found" } }
//! ```
//!
//! | Error | Status | Code |
//! |-------|--------|------|
//! | missing / non-Bearer credentials | 401 | `unauthorized` |
//! | unknown bridge, wrong token, disabled | 403 | `forbidden` |
//! | malformed request or gateway | 400 | `bad_request` |
//! | unknown bridge (read APIs) | 404 | `not_found` |
//! | provider rate limited | 429 | `rate_limited` / `embedding_failed` |
//! | provider unavailable | 503 | `provider_unavailable` / `embedding_failed` |
//! | provider timeout | 504 | `timeout` / `embedding_failed` |
//! | answer generation failed | 502 | `synthesis_failed` |
//! | store unavailable | 500 | `internal` |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the dashboard can be
//! served from a different origin.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use rainbow_intel_core::models::{BridgeStats, ChatTurn, MessagePage};
use rainbow_intel_core::Error;

use crate::app::Services;
use crate::config::Config;
use crate::gateway::{AskResponse, ConversationTurn};
use crate::ingest::{parse_bearer, IngestOutcome, RelayEvent};

type AppState = Arc<Services>;

/// Starts the server on `[server].bind` and runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::open(config).await?;
    let listener = TcpListener::bind(&config.server.bind).await?;
    serve(listener, services).await
}

/// Serve on an already-bound listener. Used by [`run_server`] and by tests
/// that bind an ephemeral port.
pub async fn serve(listener: TcpListener, services: Services) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, mode = services.mode.label(), "server listening");
    axum::serve(listener, router(services)).await?;
    Ok(())
}

pub fn router(services: Services) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/api/webhooks/ingest",
            get(handle_health).post(handle_ingest),
        )
        .route("/api/ask", post(handle_ask))
        .route("/api/chat", post(handle_chat))
        .route("/api/bridges/{id}/stats", get(handle_stats))
        .route("/api/bridges/{id}/messages", get(handle_history))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(services))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn provider_status(err: &Error) -> (StatusCode, &'static str) {
    match err {
        Error::ProviderRateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        Error::ProviderTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "provider_unavailable"),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match &err {
            Error::MissingCredentials => {
                AppError::new(StatusCode::UNAUTHORIZED, "unauthorized", err.to_string())
            }
            Error::Unauthorized => AppError::new(StatusCode::FORBIDDEN, "forbidden", err.to_string()),
            Error::Rejected(msg) => AppError::new(StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            Error::NotFound(msg) => AppError::new(StatusCode::NOT_FOUND, "not_found", msg.clone()),
            Error::ProviderUnavailable(_)
            | Error::ProviderRateLimited(_)
            | Error::ProviderTimeout(_) => {
                let (status, code) = provider_status(&err);
                AppError::new(status, code, err.to_string())
            }
            Error::EmbeddingFailed(inner) => {
                let (status, _) = provider_status(inner.root());
                AppError::new(status, "embedding_failed", err.to_string())
            }
            Error::SynthesisFailed(_) => {
                AppError::new(StatusCode::BAD_GATEWAY, "synthesis_failed", err.to_string())
            }
            Error::StoreUnavailable(detail) => {
                error!(error = %detail, "store unavailable");
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", "store unavailable")
            }
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    mode: &'static str,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "Rainbow Bridge Intelligence Layer",
        version: env!("CARGO_PKG_VERSION"),
        mode: state.mode.label(),
    })
}

// ============ POST /api/webhooks/ingest ============

#[derive(Serialize)]
#[serde(untagged)]
enum IngestResponse {
    Stored {
        success: bool,
        message: &'static str,
        id: String,
    },
    Skipped {
        success: bool,
        skipped: bool,
    },
}

async fn handle_ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<RelayEvent>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = parse_bearer(auth)?;
    let Json(event) = body.map_err(|e| bad_request(e.body_text()))?;

    let response = match state.ingest.ingest(token, &event).await? {
        IngestOutcome::Stored { id } => IngestResponse::Stored {
            success: true,
            message: "Message ingested and embedded",
            id,
        },
        IngestOutcome::Skipped => IngestResponse::Skipped {
            success: true,
            skipped: true,
        },
    };
    Ok(Json(response))
}

// ============ POST /api/ask ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskBody {
    bridge_id: String,
    question: Option<String>,
    #[serde(default)]
    conversation_history: Vec<ChatTurn>,
    #[serde(default)]
    messages: Vec<ChatTurn>,
    k: Option<usize>,
}

impl AskBody {
    fn into_turn(self) -> Result<ConversationTurn, Error> {
        match self.question {
            Some(question) => Ok(ConversationTurn {
                bridge_id: self.bridge_id,
                history: self.conversation_history,
                question,
                k: self.k,
            }),
            None => ConversationTurn::from_messages(&self.bridge_id, self.messages, self.k),
        }
    }
}

async fn handle_ask(
    State(state): State<AppState>,
    body: Result<Json<AskBody>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError> {
    let Json(body) = body.map_err(|e| bad_request(e.body_text()))?;
    let turn = body.into_turn()?;
    Ok(Json(state.gateway.ask(&turn).await?))
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatBody {
    bridge_id: String,
    messages: Vec<ChatTurn>,
    k: Option<usize>,
}

async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = body.map_err(|e| bad_request(e.body_text()))?;
    let turn = ConversationTurn::from_messages(&body.bridge_id, body.messages, body.k)?;
    let bridge_id = turn.bridge_id.clone();

    let fragments = state.gateway.chat_stream(&turn).await?.map(move |item| {
        if let Err(e) = &item {
            warn!(bridge_id = %bridge_id, error = %e, "answer stream failed mid-flight");
        }
        item
    });

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(fragments),
    )
        .into_response())
}

// ============ GET /api/bridges/{id}/... ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryParams {
    page: Option<i64>,
    page_size: Option<i64>,
}

async fn require_bridge(state: &Services, id: &str) -> Result<(), AppError> {
    match state.store.get_bridge(id).await? {
        Some(_) => Ok(()),
        None => Err(Error::NotFound(format!("bridge {}", id)).into()),
    }
}

async fn handle_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BridgeStats>, AppError> {
    require_bridge(&state, &id).await?;
    Ok(Json(state.store.stats(&id).await?))
}

async fn handle_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<MessagePage>, AppError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    require_bridge(&state, &id).await?;

    let history = &state.config.history;
    let page = params.page.unwrap_or(1);
    let page_size = params
        .page_size
        .unwrap_or(history.default_page_size)
        .min(history.max_page_size);

    Ok(Json(state.store.recent(&id, page, page_size).await?))
}
