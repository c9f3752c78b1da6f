//! Tool definitions and dispatch

use crate::models::UploadOptions;
use crate::storage::StorageService;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;

pub const NOT_CONFIGURED: &str = "Cloud storage not configured. Please check your configuration.";

/// Failures reported as JSON-RPC errors rather than as tool results.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

/// Outcome of a tool call: a JSON payload plus whether it describes a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub payload: Value,
    pub is_error: bool,
}

impl ToolResult {
    fn success(payload: Value) -> Self {
        Self {
            payload,
            is_error: false,
        }
    }

    fn failure(error: impl ToString, mut context: Value) -> Self {
        let mut payload = json!({ "success": false, "error": error.to_string() });
        if let (Some(payload), Some(context)) = (payload.as_object_mut(), context.as_object_mut()) {
            payload.append(context);
        }
        Self {
            payload,
            is_error: true,
        }
    }

    /// MCP `CallToolResult` shape with the payload as pretty JSON text.
    pub fn into_content(self) -> Value {
        let text = serde_json::to_string_pretty(&self.payload).unwrap_or_default();
        let mut result = json!({ "content": [{ "type": "text", "text": text }] });
        if self.is_error {
            result["isError"] = Value::Bool(true);
        }
        result
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadFileArgs {
    file_data: String,
    filename: String,
    content_type: Option<String>,
    metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct DeleteFileArgs {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadUrlArgs {
    key: String,
    expiration_time: Option<u64>,
}

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

pub struct ToolRegistry;

impl Default for ToolRegistry {
    fn default() -> Self {
        Self
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn list_tools(&self) -> Vec<Value> {
        vec![
            json!({
                "name": "upload_file",
                "title": "Upload File to Cloud Storage",
                "description": "Upload a file to the configured cloud storage backend and return its accessible URL",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "fileData": {
                            "type": "string",
                            "description": "Base64 encoded file content"
                        },
                        "filename": {
                            "type": "string",
                            "description": "Original name of the file"
                        },
                        "contentType": {
                            "type": "string",
                            "description": "MIME type; inferred from the extension when omitted"
                        },
                        "metadata": {
                            "type": "object",
                            "additionalProperties": { "type": "string" },
                            "description": "Extra metadata merged into the result"
                        }
                    },
                    "required": ["fileData", "filename"]
                }
            }),
            json!({
                "name": "delete_file",
                "title": "Delete File from Cloud Storage",
                "description": "Delete a file from cloud storage using the URL returned by upload_file",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "url": {
                            "type": "string",
                            "description": "URL (or object key) of the file"
                        }
                    },
                    "required": ["url"]
                }
            }),
            json!({
                "name": "get_download_url",
                "title": "Generate Download URL",
                "description": "Generate a signed, time limited download URL for an object",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "key": {
                            "type": "string",
                            "description": "Object key in storage"
                        },
                        "expirationTime": {
                            "type": "number",
                            "description": "URL lifetime in seconds (defaults to the configured value)"
                        }
                    },
                    "required": ["key"]
                }
            }),
        ]
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        storage: Option<&StorageService>,
    ) -> Result<ToolResult, ToolError> {
        match name {
            "upload_file" => {
                let args: UploadFileArgs = parse_args(name, arguments)?;
                Ok(upload_file(args, storage).await)
            }
            "delete_file" => {
                let args: DeleteFileArgs = parse_args(name, arguments)?;
                Ok(delete_file(args, storage).await)
            }
            "get_download_url" => {
                let args: DownloadUrlArgs = parse_args(name, arguments)?;
                Ok(download_url(args, storage).await)
            }
            _ => Err(ToolError::UnknownTool(name.to_string())),
        }
    }
}

async fn upload_file(args: UploadFileArgs, storage: Option<&StorageService>) -> ToolResult {
    let Some(storage) = storage else {
        return ToolResult::failure(NOT_CONFIGURED, json!({}));
    };

    let data = match STANDARD.decode(args.file_data.trim()) {
        Ok(data) => data,
        Err(e) => return ToolResult::failure(format!("Invalid base64 file data: {}", e), json!({})),
    };

    let options = UploadOptions {
        content_type: args.content_type,
        metadata: args.metadata,
    };
    match storage.upload_file(&data, &args.filename, options).await {
        Ok(outcome) => ToolResult::success(json!({
            "success": true,
            "url": outcome.url,
            "objectKey": outcome.object_key,
            "size": outcome.size,
            "contentType": outcome.content_type,
            "metadata": outcome.metadata,
        })),
        Err(e) => {
            tracing::error!(error = %e, filename = %args.filename, "upload_file failed");
            ToolResult::failure(e, json!({}))
        }
    }
}

async fn delete_file(args: DeleteFileArgs, storage: Option<&StorageService>) -> ToolResult {
    let Some(storage) = storage else {
        return ToolResult::failure(NOT_CONFIGURED, json!({ "url": args.url }));
    };

    match storage.delete_file(&args.url).await {
        Ok(()) => ToolResult::success(json!({
            "success": true,
            "message": "File deleted successfully",
            "url": args.url,
        })),
        Err(e) => {
            tracing::error!(error = %e, url = %args.url, "delete_file failed");
            ToolResult::failure(e, json!({ "url": args.url }))
        }
    }
}

async fn download_url(args: DownloadUrlArgs, storage: Option<&StorageService>) -> ToolResult {
    let Some(storage) = storage else {
        return ToolResult::failure(NOT_CONFIGURED, json!({ "key": args.key }));
    };

    let expiration = args
        .expiration_time
        .unwrap_or(storage.config_summary().download_url_expiration_seconds);
    match storage.download_url(&args.key, Some(expiration)).await {
        Ok(url) => ToolResult::success(json!({
            "success": true,
            "downloadUrl": url,
            "key": args.key,
            "expirationTime": expiration,
        })),
        Err(e) => {
            tracing::error!(error = %e, key = %args.key, "get_download_url failed");
            ToolResult::failure(e, json!({ "key": args.key }))
        }
    }
}
