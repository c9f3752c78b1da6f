//! Model Context Protocol surface
//!
//! Exposes the storage service as MCP tools (`upload_file`, `delete_file`,
//! `get_download_url`) and resources (`storage://config`, `storage://examples`).

pub mod resources;
pub mod server;
pub mod tools;

pub use server::McpServer;
pub use tools::{ToolRegistry, ToolResult};
