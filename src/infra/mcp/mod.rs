//! Model Context Protocol server: method dispatch over JSON-RPC 2.0.

pub mod protocol;
pub mod tools;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::application::compile::CompileService;

use self::{
    protocol::{Incoming, JsonRpcResponse, Reply, RequestId, RpcError},
    tools::{CONVERT_LATEX_TO_PDF, CallToolResult},
};

pub const SERVER_NAME: &str = "MCPTex";
pub const LATEST_PROTOCOL_VERSION: &str = "2025-03-26";
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-03-26", "2024-11-05"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    protocol_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    protocol_version: String,
    capabilities: Value,
    server_info: ServerInfo,
}

#[derive(Debug, Clone, Serialize)]
struct ServerInfo {
    name: &'static str,
    version: &'static str,
}

/// Protocol front door shared by every transport.
#[derive(Debug, Clone)]
pub struct McpServer {
    compile: CompileService,
}

impl McpServer {
    pub fn new(compile: CompileService) -> Self {
        Self { compile }
    }

    /// Handle one raw payload: a single message or a batch.
    ///
    /// Returns `None` when nothing needs to be sent back.
    pub async fn handle_payload(&self, payload: &[u8]) -> Option<Reply> {
        match serde_json::from_slice::<Value>(payload) {
            Ok(value) => self.handle_value(value).await,
            Err(err) => {
                debug!(
                    target = "infra::mcp",
                    op = "mcp::handle_payload",
                    result = "parse_error",
                    error = %err,
                    "Discarding unparseable JSON-RPC payload"
                );
                Some(Reply::Single(JsonRpcResponse::failure(
                    None,
                    RpcError::parse_error(err),
                )))
            }
        }
    }

    pub async fn handle_value(&self, value: Value) -> Option<Reply> {
        match value {
            Value::Array(messages) if messages.is_empty() => Some(Reply::Single(
                JsonRpcResponse::failure(None, RpcError::invalid_request("empty batch")),
            )),
            Value::Array(messages) => {
                let mut responses = Vec::with_capacity(messages.len());
                for message in messages {
                    if let Some(response) = self.handle_message(message).await {
                        responses.push(response);
                    }
                }
                (!responses.is_empty()).then_some(Reply::Batch(responses))
            }
            message => self.handle_message(message).await.map(Reply::Single),
        }
    }

    async fn handle_message(&self, message: Value) -> Option<JsonRpcResponse> {
        match Incoming::classify(message) {
            Incoming::Request { id, method, params } => {
                Some(self.handle_request(id, &method, params).await)
            }
            Incoming::Notification { method, .. } => {
                debug!(
                    target = "infra::mcp",
                    op = "mcp::notification",
                    method = %method,
                    "Notification received"
                );
                None
            }
            Incoming::Response => None,
            Incoming::Invalid { id, error } => Some(JsonRpcResponse::failure(id, error)),
        }
    }

    async fn handle_request(
        &self,
        id: RequestId,
        method: &str,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        match self.dispatch(method, params).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => {
                debug!(
                    target = "infra::mcp",
                    op = "mcp::dispatch",
                    result = "error",
                    method = %method,
                    error_code = error.code,
                    error = %error.message,
                    "Request rejected"
                );
                JsonRpcResponse::failure(Some(id), error)
            }
        }
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        match method {
            "initialize" => self.initialize(params),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tools::definitions() })),
            "tools/call" => self.call_tool(params).await,
            other => Err(RpcError::method_not_found(other)),
        }
    }

    fn initialize(&self, params: Option<Value>) -> Result<Value, RpcError> {
        let params: InitializeParams = match params {
            Some(params) => serde_json::from_value(params).map_err(RpcError::invalid_params)?,
            None => InitializeParams::default(),
        };

        let protocol_version = params
            .protocol_version
            .filter(|requested| SUPPORTED_PROTOCOL_VERSIONS.contains(&requested.as_str()))
            .unwrap_or_else(|| LATEST_PROTOCOL_VERSION.to_string());

        info!(
            target = "infra::mcp",
            op = "mcp::initialize",
            protocol_version = %protocol_version,
            "Client session initialized"
        );

        to_value(InitializeResult {
            protocol_version,
            capabilities: json!({ "tools": { "listChanged": false } }),
            server_info: ServerInfo {
                name: SERVER_NAME,
                version: env!("CARGO_PKG_VERSION"),
            },
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, RpcError> {
        let params: CallToolParams = params
            .ok_or_else(|| RpcError::invalid_params("missing params"))
            .and_then(|params| serde_json::from_value(params).map_err(RpcError::invalid_params))?;

        if params.name != CONVERT_LATEX_TO_PDF {
            return Err(RpcError::invalid_params(format!(
                "unknown tool `{}`",
                params.name
            )));
        }

        let result = match tools::parse_compile_arguments(params.arguments.as_ref()) {
            Ok(request) => CallToolResult::from(self.compile.compile(&request).await),
            Err(message) => {
                warn!(
                    target = "infra::mcp",
                    op = "mcp::call_tool",
                    result = "invalid_arguments",
                    tool = CONVERT_LATEX_TO_PDF,
                    error = %message,
                    "Tool call rejected"
                );
                CallToolResult::error(message)
            }
        };

        to_value(result)
    }
}

fn to_value(value: impl Serialize) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(RpcError::internal)
}
