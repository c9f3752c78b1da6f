//! Storage service: validation plus delegation to the configured backend.
//!
//! This is the single entry point for the protocol layer. Every failure leaving
//! it is wrapped as [`Error::Storage`] naming the failed operation.

use crate::backends::{BackendFactory, StorageBackend};
use crate::config::StorageConfig;
use crate::error::Operation;
use crate::models::{BackendInfo, ConfigSummary, UploadOptions, UploadOutcome};
use crate::validation::{infer_mime_type, FileValidator, ValidationError};
use crate::{Error, Result};
use std::time::Duration;

pub struct StorageService {
    backend: Box<dyn StorageBackend>,
    validator: FileValidator,
    config: StorageConfig,
}

impl StorageService {
    /// Validates `config` and constructs its backend.
    pub fn new(config: StorageConfig) -> Result<Self> {
        config.validate()?;
        let backend = BackendFactory::create(&config.backend)?;
        Ok(Self::with_backend(config, backend))
    }

    /// Uses an already constructed backend, e.g. a mock.
    pub fn with_backend(config: StorageConfig, backend: Box<dyn StorageBackend>) -> Self {
        Self {
            validator: FileValidator::new(&config),
            backend,
            config,
        }
    }

    pub async fn upload_file(
        &self,
        data: &[u8],
        filename: &str,
        options: UploadOptions,
    ) -> Result<UploadOutcome> {
        let content_type = options
            .content_type
            .unwrap_or_else(|| infer_mime_type(filename).to_string());

        self.validator
            .validate(data, filename, Some(&content_type))
            .map_err(|e| Error::from(e).during(Operation::Upload))?;

        let mut outcome = self
            .backend
            .upload(data, filename, Some(&content_type))
            .await
            .map_err(|e| e.during(Operation::Upload))?;

        if let Some(metadata) = options.metadata {
            outcome.merge_metadata(metadata);
        }

        tracing::info!(
            backend = %self.backend.name(),
            key = %outcome.object_key,
            size_bytes = outcome.size,
            "Uploaded {}",
            filename
        );
        Ok(outcome)
    }

    pub async fn delete_file(&self, url: &str) -> Result<()> {
        let deleter = self
            .backend
            .deleter()
            .ok_or_else(|| self.unsupported(Operation::Delete))?;

        deleter
            .delete(url)
            .await
            .map_err(|e| e.during(Operation::Delete))?;

        tracing::info!(backend = %self.backend.name(), "Deleted {}", url);
        Ok(())
    }

    /// Signed download URL for `key`, valid for `expiration_seconds` or the
    /// configured default.
    pub async fn download_url(&self, key: &str, expiration_seconds: Option<u64>) -> Result<String> {
        let signer = self
            .backend
            .url_signer()
            .ok_or_else(|| self.unsupported(Operation::DownloadUrl))?;

        let seconds = expiration_seconds.unwrap_or(self.config.download_url_expiration_seconds);
        if seconds == 0 {
            return Err(Error::from(ValidationError::InvalidExpiration).during(Operation::DownloadUrl));
        }
        if key.trim().is_empty() {
            return Err(Error::InvalidKey("object key cannot be empty".to_string())
                .during(Operation::DownloadUrl));
        }

        let url = signer
            .download_url(key, Duration::from_secs(seconds))
            .await
            .map_err(|e| e.during(Operation::DownloadUrl))?;

        tracing::debug!(backend = %self.backend.name(), key = %key, expires_in = seconds, "Signed download URL");
        Ok(url)
    }

    pub fn backend_info(&self) -> BackendInfo {
        BackendInfo::new(self.backend.name(), self.backend.kind())
    }

    pub fn config_summary(&self) -> ConfigSummary {
        ConfigSummary::from(&self.config)
    }

    fn unsupported(&self, operation: Operation) -> Error {
        Error::Unsupported {
            backend: self.backend.name().to_string(),
            operation,
        }
        .during(operation)
    }
}
