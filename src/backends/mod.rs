//! Cloud storage backends
//!
//! Every provider adapter implements [`StorageBackend`]. Deleting objects and
//! signing download URLs are separate capabilities an adapter may or may not
//! expose; callers query them instead of assuming support.

pub mod mock;
pub mod oss;
pub mod qiniu;
pub mod s3;

pub use mock::MockBackend;
pub use oss::OssBackend;
pub use qiniu::QiniuBackend;
pub use s3::S3Backend;

use crate::config::{BackendDescriptor, BackendKind};
use crate::models::UploadOutcome;
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;

/// I/O timeout for the REST based adapters; the core adds no timeout of its own.
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Unix timestamp `expires_in` from now, or `None` when it does not fit in an `i64`.
pub(crate) fn expiry_deadline(expires_in: Duration) -> Option<i64> {
    let seconds = i64::try_from(expires_in.as_secs()).ok()?;
    chrono::Utc::now().timestamp().checked_add(seconds)
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Human readable provider name, used in metadata and error messages.
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    async fn upload(
        &self,
        data: &[u8],
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<UploadOutcome>;

    fn deleter(&self) -> Option<&dyn DeleteObject> {
        None
    }

    fn url_signer(&self) -> Option<&dyn SignDownloadUrl> {
        None
    }
}

#[async_trait]
pub trait DeleteObject: Send + Sync {
    /// Deletes the object behind `url` (or a bare object key). Deleting an object
    /// that is already gone succeeds.
    async fn delete(&self, url: &str) -> Result<()>;
}

#[async_trait]
pub trait SignDownloadUrl: Send + Sync {
    async fn download_url(&self, key: &str, expires_in: Duration) -> Result<String>;
}

/// Builds the single backend selected by configuration.
pub struct BackendFactory;

impl BackendFactory {
    /// Performs no network I/O; missing or empty required fields fail here
    /// rather than on first use.
    pub fn create(descriptor: &BackendDescriptor) -> Result<Box<dyn StorageBackend>> {
        let backend: Box<dyn StorageBackend> = match descriptor {
            BackendDescriptor::S3(config) => Box::new(S3Backend::new(config)?),
            BackendDescriptor::Qiniu(config) => Box::new(QiniuBackend::new(config)?),
            BackendDescriptor::AlibabaOss(config) => Box::new(OssBackend::new(config)?),
        };
        tracing::info!(
            "Initialized {} backend ({})",
            backend.name(),
            descriptor.kind()
        );
        Ok(backend)
    }

    /// Like [`BackendFactory::create`] but from an untyped descriptor; an unknown
    /// `type` fails with [`crate::Error::UnsupportedBackend`].
    pub fn create_from_value(value: &serde_json::Value) -> Result<Box<dyn StorageBackend>> {
        Self::create(&BackendDescriptor::from_value(value)?)
    }

    pub fn supported_backends() -> Vec<&'static str> {
        BackendKind::ALL.iter().map(|kind| kind.as_str()).collect()
    }
}
