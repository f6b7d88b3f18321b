//! Streamable HTTP transport (JSON responses, no server-initiated stream).

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::Mutex};
use tokio_util::sync::CancellationToken;

use ica_core::{config::Config, errors::Error, Result};

use crate::{
    protocol::{respond_err, INVALID_REQUEST, PARSE_ERROR},
    session::{SessionLimits, SessionStore},
    McpServer,
};

pub const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Clone)]
struct HttpState {
    server: Arc<McpServer>,
    sessions: Arc<Mutex<SessionStore>>,
}

pub fn router(server: Arc<McpServer>, mcp_path: &str, limits: SessionLimits) -> Router {
    let state = HttpState {
        server,
        sessions: Arc::new(Mutex::new(SessionStore::new(limits))),
    };

    Router::new()
        .route(
            mcp_path,
            post(handle_post).delete(handle_delete).get(handle_get),
        )
        .route("/health", get(health))
        .with_state(state)
}

/// Bind and serve until `cancel` fires.
pub async fn serve(server: Arc<McpServer>, cfg: &Config, cancel: CancellationToken) -> Result<()> {
    let addr = cfg.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, path = %cfg.mcp_path, "mcp http transport listening");

    let app = router(server, &cfg.mcp_path, SessionLimits::from_config(cfg));
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(Error::Io)?;

    tracing::info!("mcp http transport stopped");
    Ok(())
}

async fn health(State(state): State<HttpState>) -> Json<Value> {
    Json(json!({ "status": "ok", "version": state.server.version() }))
}

async fn handle_get() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST, DELETE")],
    )
        .into_response()
}

async fn handle_post(State(state): State<HttpState>, headers: HeaderMap, body: Bytes) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable mcp body");
            return rpc_error(StatusCode::BAD_REQUEST, PARSE_ERROR, "Parse error");
        }
    };

    let new_session = if has_initialize(&payload) {
        let id = state.sessions.lock().await.create();
        tracing::info!(session = %id, "mcp session created");
        Some(id)
    } else {
        if let Err(resp) = require_session(&state, &headers).await {
            return resp;
        }
        None
    };

    let Some(reply) = state.server.handle_payload(payload).await else {
        return StatusCode::ACCEPTED.into_response();
    };

    let mut resp = Json(reply).into_response();
    if let Some(id) = new_session.and_then(|id| HeaderValue::from_str(&id).ok()) {
        resp.headers_mut().insert(SESSION_HEADER, id);
    }
    resp
}

async fn handle_delete(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let id = match require_session(&state, &headers).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if let Some(session) = state.sessions.lock().await.remove(&id) {
        tracing::info!(
            session = %id,
            age_secs = session.created_at.elapsed().as_secs(),
            "mcp session terminated"
        );
    }
    StatusCode::OK.into_response()
}

async fn require_session(state: &HttpState, headers: &HeaderMap) -> std::result::Result<String, Response> {
    let Some(id) = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    else {
        return Err(rpc_error(
            StatusCode::BAD_REQUEST,
            INVALID_REQUEST,
            "Bad Request: missing Mcp-Session-Id header",
        ));
    };

    if !state.sessions.lock().await.touch(id) {
        return Err(rpc_error(
            StatusCode::NOT_FOUND,
            INVALID_REQUEST,
            "Session not found",
        ));
    }
    Ok(id.to_string())
}

fn has_initialize(payload: &Value) -> bool {
    let is_init = |m: &Value| m.get("method").and_then(|v| v.as_str()) == Some("initialize");
    match payload {
        Value::Array(items) => items.iter().any(is_init),
        other => is_init(other),
    }
}

fn rpc_error(status: StatusCode, code: i64, message: &str) -> Response {
    (status, Json(respond_err(Value::Null, code, message))).into_response()
}
