//! Streamable HTTP transport for the MCP server.

mod middleware;

pub use middleware::RequestContext;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use crate::{
    application::error::ErrorReport,
    infra::mcp::{
        McpServer,
        protocol::{INVALID_REQUEST, PARSE_ERROR, Reply},
    },
};

pub const MCP_PATH: &str = "/mcp";
pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Clone)]
pub struct HttpState {
    pub mcp: McpServer,
}

/// Build the router serving `POST /mcp` and `GET /health`.
pub fn build_router(state: HttpState, body_limit: usize) -> Router {
    Router::new()
        .route(MCP_PATH, post(mcp_endpoint))
        .route(HEALTH_PATH, get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
        .with_state(state)
}

async fn mcp_endpoint(State(state): State<HttpState>, body: Bytes) -> Response {
    let Some(reply) = state.mcp.handle_payload(&body).await else {
        return StatusCode::ACCEPTED.into_response();
    };

    let status = reply_status(&reply);
    let mut response = (status, Json(&reply)).into_response();

    if status == StatusCode::BAD_REQUEST
        && let Reply::Single(single) = &reply
        && let Some(error) = single.error.as_ref()
    {
        ErrorReport::from_error("infra::http::mcp_endpoint", status, error).attach(&mut response);
    }

    response
}

/// Envelope-level failures without a request id are reported as `400`.
fn reply_status(reply: &Reply) -> StatusCode {
    match reply {
        Reply::Single(response)
            if response.id.is_none()
                && response
                    .error
                    .as_ref()
                    .is_some_and(|err| err.code == PARSE_ERROR || err.code == INVALID_REQUEST) =>
        {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::OK,
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
