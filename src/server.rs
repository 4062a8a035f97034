//! JSON HTTP API over retrieval and question answering.
//!
//! The ingester runs in the background of the same process; `/health`
//! reports its progress.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Version, ingester health, stored record count |
//! | `POST` | `/search` | `{ "query", "top_k"? }` → ranked lines + context |
//! | `POST` | `/ask` | `{ "question" }` → retrieval + model answer |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `timeout` (408), `model_error` (502),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use loglens_core::retrieval::Retrieval;
use loglens_core::store::VectorStore;

use crate::app::{shutdown_signal, App};
use crate::ask::{Analyst, Answer};
use crate::config::Config;
use crate::service::{HealthHandle, IngestHealth};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub analyst: Analyst,
    pub store: Arc<dyn VectorStore>,
    pub health: HealthHandle,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", post(handle_search))
        .route("/ask", post(handle_ask))
        .layer(cors)
        .with_state(state)
}

/// `loglens serve`: run the ingester and the HTTP API until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = App::open(config).await?;
    let service = app.spawn_ingest();
    let state = AppState {
        analyst: app.analyst()?,
        store: app.store_handle(),
        health: service.health_handle(),
    };

    let listener = TcpListener::bind(&config.server.bind).await?;
    println!("loglens listening on http://{}", config.server.bind);
    let served = serve(listener, state, shutdown_signal()).await;

    service.stop().await?;
    app.close().await;
    served
}

/// Serve on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
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

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn classify_error(err: anyhow::Error) -> AppError {
    let message = format!("{:#}", err);
    let (status, code) = if message.contains("timed out") {
        (StatusCode::REQUEST_TIMEOUT, "timeout")
    } else if message.contains("Ollama") || message.contains("OpenAI") {
        (StatusCode::BAD_GATEWAY, "model_error")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "internal")
    };
    tracing::warn!(code, error = %message, "request failed");
    AppError {
        status,
        code,
        message,
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    ingest: IngestHealth,
    records: Option<usize>,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let records = match state.store.count().await {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::warn!(error = %e, "failed to count records");
            None
        }
    };
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        ingest: state.health.snapshot(),
        records,
    })
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Retrieval>, AppError> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let mut retrieval = state.analyst.retrieval().clone();
    if let Some(k) = req.top_k {
        if k == 0 {
            return Err(bad_request("top_k must be >= 1"));
        }
        retrieval = retrieval.with_top_k(k);
    }
    retrieval
        .search(query)
        .await
        .map(Json)
        .map_err(classify_error)
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<Answer>, AppError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    state
        .analyst
        .ask(question)
        .await
        .map(Json)
        .map_err(classify_error)
}
