//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/indexes` | List built indexes |
//! | `POST` | `/ask` | Answer a question from an index |
//! | `POST` | `/sql/translate` | Translate a question to SQL without running it |
//! | `POST` | `/sql/run` | Translate, record and execute |
//! | `GET`  | `/sql/history` | Recent questions and their SQL |
//! | `POST` | `/chat` | Continue the saved conversation |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "index_not_found", "message": "index not found: handbook" } }
//! ```
//!
//! Codes are those of the pipeline error kinds plus `bad_request`.
//!
//! Pipeline calls are serialized: the context sits behind one async mutex,
//! so at most one request touches the stores or models at a time.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use query_harness_core::qa::Answer;
use query_harness_core::store::IndexManifest;
use query_harness_core::Error;

use crate::context::{AppContext, SqlRun};
use crate::history::HistoryEntry;

type SharedContext = Arc<Mutex<AppContext>>;

/// Build the router over a context.
pub fn router(ctx: AppContext) -> Router {
    let state: SharedContext = Arc::new(Mutex::new(ctx));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/indexes", get(handle_indexes))
        .route("/ask", post(handle_ask))
        .route("/sql/translate", post(handle_translate))
        .route("/sql/run", post(handle_sql_run))
        .route("/sql/history", get(handle_history))
        .route("/chat", post(handle_chat))
        .layer(cors)
        .with_state(state)
}

/// Serve until the process is terminated.
pub async fn run_server(ctx: AppContext) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let app = router(ctx);

    println!("Listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

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
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::InvalidConfiguration(_) => StatusCode::BAD_REQUEST,
            Error::IndexNotFound(_) => StatusCode::NOT_FOUND,
            Error::DimensionMismatch { .. } => StatusCode::CONFLICT,
            Error::Execution(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Embedding(_) | Error::Generation(_) | Error::Translation(_) => {
                StatusCode::BAD_GATEWAY
            }
            Error::Indexing(_) | Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(code = err.code(), "{}", err);
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(bad_request(format!("{} must not be empty", field)));
    }
    Ok(())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /indexes ============

#[derive(Serialize)]
struct IndexListResponse {
    indexes: Vec<IndexManifest>,
}

async fn handle_indexes(
    State(ctx): State<SharedContext>,
) -> Result<Json<IndexListResponse>, AppError> {
    let ctx = ctx.lock().await;
    let indexes = ctx.list_indexes().await?;
    Ok(Json(IndexListResponse { indexes }))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    index: String,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn handle_ask(
    State(ctx): State<SharedContext>,
    Json(req): Json<AskRequest>,
) -> Result<Json<Answer>, AppError> {
    require_text("question", &req.question)?;
    require_text("index", &req.index)?;
    let ctx = ctx.lock().await;
    Ok(Json(ctx.ask(&req.question, &req.index, req.top_k).await?))
}

// ============ POST /sql/translate, /sql/run ============

#[derive(Deserialize)]
struct QuestionRequest {
    question: String,
}

#[derive(Serialize)]
struct TranslateResponse {
    question: String,
    sql: String,
}

async fn handle_translate(
    State(ctx): State<SharedContext>,
    Json(req): Json<QuestionRequest>,
) -> Result<Json<TranslateResponse>, AppError> {
    require_text("question", &req.question)?;
    let ctx = ctx.lock().await;
    let sql = ctx.translate(&req.question).await?;
    Ok(Json(TranslateResponse {
        question: req.question,
        sql,
    }))
}

async fn handle_sql_run(
    State(ctx): State<SharedContext>,
    Json(req): Json<QuestionRequest>,
) -> Result<Json<SqlRun>, AppError> {
    require_text("question", &req.question)?;
    let ctx = ctx.lock().await;
    Ok(Json(ctx.run_question(&req.question).await?))
}

// ============ GET /sql/history ============

#[derive(Serialize)]
struct HistoryResponse {
    entries: Vec<HistoryEntry>,
}

async fn handle_history(
    State(ctx): State<SharedContext>,
) -> Result<Json<HistoryResponse>, AppError> {
    let ctx = ctx.lock().await;
    Ok(Json(HistoryResponse {
        entries: ctx.history()?,
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
}

async fn handle_chat(
    State(ctx): State<SharedContext>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    require_text("message", &req.message)?;
    let ctx = ctx.lock().await;
    Ok(Json(ChatResponse {
        reply: ctx.chat(&req.message).await?,
    }))
}
