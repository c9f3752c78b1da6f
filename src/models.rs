//! Data models and structures
//!
//! Defines the values exchanged between the storage service, the backend
//! adapters and the protocol layer.

use crate::config::{BackendKind, StorageConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result of a successful upload. Never produced for a failed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub url: String,
    pub object_key: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl UploadOutcome {
    /// Overlays caller metadata; caller keys win on conflict.
    pub fn merge_metadata(&mut self, extra: HashMap<String, String>) {
        self.metadata.extend(extra);
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub content_type: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

impl UploadOptions {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Configuration view safe to expose: no credentials.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub backend: String,
    pub max_file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_mime_types: Option<Vec<String>>,
    pub download_url_expiration_seconds: u64,
}

impl From<&StorageConfig> for ConfigSummary {
    fn from(config: &StorageConfig) -> Self {
        Self {
            backend: config.backend.kind().to_string(),
            max_file_size: config.max_file_size,
            allowed_mime_types: config.allowed_mime_types.clone(),
            download_url_expiration_seconds: config.download_url_expiration_seconds,
        }
    }
}

impl BackendInfo {
    pub fn new(name: &str, kind: BackendKind) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
        }
    }
}
