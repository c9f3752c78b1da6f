//! JSON-RPC 2.0 over stdio: one request per line in, one response per line out.

use super::resources;
use super::tools::ToolRegistry;
use crate::storage::StorageService;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

#[derive(Debug, Serialize)]
pub struct McpResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<McpError>,
}

#[derive(Debug, Serialize)]
pub struct McpError {
    code: i32,
    message: String,
}

impl McpResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(McpError {
                code,
                message: message.into(),
            }),
        }
    }
}

pub struct McpServer {
    storage: Option<StorageService>,
    tool_registry: ToolRegistry,
}

impl McpServer {
    /// `storage` is `None` when configuration failed; tools then report that
    /// storage is not configured.
    pub fn new(storage: Option<StorageService>) -> Self {
        Self {
            storage,
            tool_registry: ToolRegistry::new(),
        }
    }

    pub async fn run(&self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        tracing::info!("Cloud storage MCP server listening on stdio");

        while let Some(line) = lines.next_line().await.context("Failed to read from stdin")? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(response) = self.handle_message(trimmed).await {
                let mut output =
                    serde_json::to_string(&response).context("Failed to serialize response")?;
                output.push('\n');
                stdout
                    .write_all(output.as_bytes())
                    .await
                    .context("Failed to write to stdout")?;
                stdout.flush().await.context("Failed to flush stdout")?;
            }
        }

        tracing::info!("stdin closed, shutting down");
        Ok(())
    }

    /// Handles one raw message. Notifications (no `id`) get no response.
    pub async fn handle_message(&self, line: &str) -> Option<McpResponse> {
        let request: Value = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                return Some(McpResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ))
            }
        };

        let id = request.get("id").cloned();
        let Some(method) = request.get("method").and_then(Value::as_str) else {
            return Some(McpResponse::error(
                id.unwrap_or(Value::Null),
                INVALID_REQUEST,
                "Missing method field",
            ));
        };

        let Some(id) = id else {
            tracing::debug!("Notification {}", method);
            return None;
        };

        let params = request.get("params").cloned().unwrap_or(Value::Null);
        Some(self.dispatch(id, method, params).await)
    }

    async fn dispatch(&self, id: Value, method: &str, params: Value) -> McpResponse {
        match method {
            "initialize" => McpResponse::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {
                        "tools": {},
                        "resources": {}
                    },
                    "serverInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            ),
            "ping" => McpResponse::success(id, json!({})),
            "tools/list" => {
                McpResponse::success(id, json!({ "tools": self.tool_registry.list_tools() }))
            }
            "tools/call" => {
                let Some(name) = params.get("name").and_then(Value::as_str) else {
                    return McpResponse::error(id, INVALID_PARAMS, "Missing tool name");
                };
                let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

                match self
                    .tool_registry
                    .call_tool(name, arguments, self.storage.as_ref())
                    .await
                {
                    Ok(result) => McpResponse::success(id, result.into_content()),
                    Err(e) => McpResponse::error(id, INVALID_PARAMS, e.to_string()),
                }
            }
            "resources/list" => {
                McpResponse::success(id, json!({ "resources": resources::list_resources() }))
            }
            "resources/read" => {
                let Some(uri) = params.get("uri").and_then(Value::as_str) else {
                    return McpResponse::error(id, INVALID_PARAMS, "Missing resource uri");
                };
                match resources::read_resource(uri, self.storage.as_ref()) {
                    Some(contents) => McpResponse::success(id, contents),
                    None => {
                        McpResponse::error(id, INVALID_PARAMS, format!("Unknown resource: {}", uri))
                    }
                }
            }
            _ => McpResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", method)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockBackend;
    use crate::config::{BackendDescriptor, S3Config, StorageConfig};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    fn configured() -> McpServer {
        let config = StorageConfig::new(BackendDescriptor::S3(S3Config {
            access_key_id: "AKIA".to_string(),
            secret_access_key: "secret".to_string(),
            region: "us-east-1".to_string(),
            bucket: "test-bucket".to_string(),
            endpoint: None,
            prefix: None,
            cdn: None,
            public_read: true,
        }));
        McpServer::new(Some(StorageService::with_backend(
            config,
            Box::new(MockBackend::new()),
        )))
    }

    async fn call(server: &McpServer, request: Value) -> Value {
        let response = server
            .handle_message(&request.to_string())
            .await
            .expect("request should get a response");
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let response = call(
            &configured(),
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": { "name": "test", "version": "1.0" }
                }
            }),
        )
        .await;

        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(response["result"]["serverInfo"]["name"], "cloud-storage-mcp");
        assert!(response.get("error").is_none());
    }

    #[tokio::test]
    async fn test_notification_has_no_response() {
        let server = configured();
        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_parse_error_and_unknown_method() {
        let server = configured();

        let response = serde_json::to_value(server.handle_message("{not json").await.unwrap()).unwrap();
        assert_eq!(response["error"]["code"], PARSE_ERROR);
        assert_eq!(response["id"], Value::Null);

        let response = call(&server, json!({"jsonrpc": "2.0", "id": "a", "method": "prompts/list"})).await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(response["id"], "a");
    }

    #[tokio::test]
    async fn test_tools_call_upload() {
        let response = call(
            &configured(),
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "tools/call",
                "params": {
                    "name": "upload_file",
                    "arguments": { "fileData": STANDARD.encode("0123456789"), "filename": "a.txt" }
                }
            }),
        )
        .await;

        let result = &response["result"];
        assert!(result.get("isError").is_none());
        let payload: Value =
            serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(payload["success"], true);
        assert_eq!(payload["contentType"], "text/plain");
        assert!(payload["url"].as_str().unwrap().ends_with(".txt"));
    }

    #[tokio::test]
    async fn test_tools_call_unconfigured() {
        let server = McpServer::new(None);
        let response = call(
            &server,
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "method": "tools/call",
                "params": { "name": "get_download_url", "arguments": { "key": "k" } }
            }),
        )
        .await;

        assert_eq!(response["result"]["isError"], true);
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("Cloud storage not configured"));
    }

    #[tokio::test]
    async fn test_tools_call_invalid_params() {
        let response = call(
            &configured(),
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "tools/call",
                "params": { "name": "upload_file", "arguments": { "filename": "a.txt" } }
            }),
        )
        .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_resources() {
        let server = configured();

        let response = call(&server, json!({"jsonrpc": "2.0", "id": 4, "method": "resources/list"})).await;
        assert_eq!(response["result"]["resources"].as_array().unwrap().len(), 2);

        let response = call(
            &server,
            json!({
                "jsonrpc": "2.0",
                "id": 5,
                "method": "resources/read",
                "params": { "uri": "storage://config" }
            }),
        )
        .await;
        assert_eq!(response["result"]["contents"][0]["uri"], "storage://config");

        let response = call(
            &server,
            json!({
                "jsonrpc": "2.0",
                "id": 6,
                "method": "resources/read",
                "params": { "uri": "storage://nope" }
            }),
        )
        .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }
}
