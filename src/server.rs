//! HTTP tool server.
//!
//! Exposes the code-intelligence tools as a JSON HTTP API for editors and
//! agents. All tools, built-in or registered by an embedding binary, live in
//! one [`ToolRegistry`] and are dispatched through `POST /tools/{name}`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call a tool by name |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Request-level failures use one shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "missing required parameter: symbol" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `tool_error` (500).
//!
//! A symbol that does not exist, or an index that cannot be opened, is not
//! a request failure: those come back as `200` with the tool's own
//! `{"error": "Symbol not found" | "Database error", ...}` result.
//!
//! # Concurrency
//!
//! Requests share one bounded pool of read-only connections
//! (`db.max_connections`). No tool writes envelopes, so handlers need no
//! further locking.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::store::SymbolStore;
use crate::tools::{validate_params, ToolContext, ToolInfo, ToolRegistry};
use crate::usage_log::UsageLog;

#[derive(Clone)]
struct AppState {
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
    usage: Arc<UsageLog>,
}

/// Start the server on `[server].bind` with the built-in tools. Runs until
/// the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    run_server_with_extensions(config, ToolRegistry::new()).await
}

/// Like [`run_server`], with extra tools served after the built-ins. An
/// extra tool whose name is already taken is skipped.
pub async fn run_server_with_extensions(
    config: &Config,
    extra_tools: ToolRegistry,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.server.bind).await?;
    println!(
        "Tool server listening on http://{}",
        listener.local_addr()?
    );
    serve(listener, config, extra_tools).await
}

/// Serve on an already-bound listener.
pub async fn serve(
    listener: TcpListener,
    config: &Config,
    extra_tools: ToolRegistry,
) -> anyhow::Result<()> {
    let mut registry = ToolRegistry::with_builtins();
    for tool in extra_tools.into_tools() {
        if registry.find(tool.name()).is_some() {
            log::warn!("tool '{}' is already registered, skipping", tool.name());
            continue;
        }
        registry.register(tool);
    }

    for t in registry.tools() {
        let tag = if t.is_builtin() { "builtin" } else { "extension" };
        log::info!("POST /tools/{} ({})", t.name(), tag);
    }

    if !config.db.path.exists() {
        log::warn!(
            "symbol index {} does not exist yet; query tools will report a database error",
            config.db.path.display()
        );
    }

    let state = AppState {
        ctx: ToolContext::new(Arc::new(config.clone()), SymbolStore::open_lazy(config)),
        tools: Arc::new(registry),
        usage: Arc::new(UsageLog::from_path(config.logging.usage_log.as_deref())),
    };

    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn tool_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "tool_error".to_string(),
        message: message.into(),
    }
}

/// Map a tool's `Err` to a status. Input problems the schema could not
/// express (empty names, bad `k`, unknown artifacts) are the caller's
/// fault; anything else is a 500.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let msg = err.to_string();

    if msg.contains("must not be empty")
        || msg.contains("must be")
        || msg.contains("invalid")
        || msg.contains("Unknown artifact")
    {
        bad_request(format!("{}: {}", tool_name, msg))
    } else {
        log::error!("tool '{}' failed: {:#}", tool_name, err);
        tool_error(format!("{}: {}", tool_name, msg))
    }
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

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo::of(t.as_ref()))
        .collect();
    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

/// Returns `404` for an unknown tool, `400` for invalid parameters, and
/// `500` when a tool fails unexpectedly.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let started = Instant::now();
    let outcome = match validate_params(&tool.parameters_schema(), &params) {
        Ok(validated) => tool
            .execute(validated, &state.ctx)
            .await
            .map_err(|e| classify_tool_error(&name, e)),
        Err(e) => Err(bad_request(e.to_string())),
    };
    state.usage.record(&name, outcome.is_ok(), started.elapsed());

    let result = outcome?;
    Ok(Json(serde_json::json!({ "result": result })))
}
