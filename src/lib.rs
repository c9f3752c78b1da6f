//! Cloud storage MCP server
//!
//! Uploads files to, deletes them from, and signs download URLs for one of several
//! cloud object stores (AWS S3 and S3 compatible stores, Qiniu Kodo, Alibaba Cloud
//! OSS) selected by configuration, and exposes those operations as MCP tools.

pub mod backends;
pub mod config;
pub mod error;
pub mod keys;
pub mod mcp;
pub mod models;
pub mod storage;
pub mod validation;

pub use error::{Error, Result};
