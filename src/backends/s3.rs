use super::{DeleteObject, SignDownloadUrl, StorageBackend};
use crate::config::{BackendKind, S3Config};
use crate::error::Operation;
use crate::keys::{encode_key, KeyCodec};
use crate::models::UploadOutcome;
use crate::validation::DEFAULT_MIME_TYPE;
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{Credentials, Region, RequestChecksumCalculation};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client as S3Client;
use std::collections::HashMap;
use std::time::Duration;

const NAME: &str = "AWS S3";

/// Adapter for AWS S3 and S3-compatible stores (MinIO, DigitalOcean Spaces, ...).
pub struct S3Backend {
    client: S3Client,
    bucket: String,
    region: String,
    endpoint: Option<String>,
    public_read: bool,
    keys: KeyCodec,
}

impl S3Backend {
    pub fn new(config: &S3Config) -> Result<Self> {
        config.validate()?;

        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "cloud-storage-config",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .retry_config(RetryConfig::disabled())
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired);

        let endpoint = config
            .endpoint
            .as_deref()
            .map(|e| e.trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty());
        if let Some(endpoint) = &endpoint {
            // Custom endpoints need path-style addressing
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: S3Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint,
            public_read: config.public_read,
            keys: KeyCodec::new(config.prefix.as_deref(), config.cdn.as_deref()),
        })
    }

    /// Path-style URL under a custom endpoint, virtual-hosted AWS URL otherwise.
    fn native_url(&self, key: &str) -> String {
        let path = encode_key(key);
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint, self.bucket, path),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, path
            ),
        }
    }

    fn key_from_reference(&self, reference: &str) -> Result<String> {
        let key = self.keys.key_from_reference(reference)?;
        let from_path_style = self.endpoint.as_ref().is_some_and(|endpoint| {
            reference.starts_with(endpoint.as_str())
        });
        if from_path_style {
            if let Some(stripped) = key.strip_prefix(&format!("{}/", self.bucket)) {
                return Ok(stripped.to_string());
            }
        }
        Ok(key)
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::S3
    }

    async fn upload(
        &self,
        data: &[u8],
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<UploadOutcome> {
        let key = self.keys.generate(filename);
        let size = data.len() as u64;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()))
            .content_type(content_type.unwrap_or(DEFAULT_MIME_TYPE));
        if self.public_read {
            request = request.acl(ObjectCannedAcl::PublicRead);
        }

        let output = request.send().await.map_err(|e| {
            tracing::error!(
                error = %DisplayErrorContext(&e),
                bucket = %self.bucket,
                key = %key,
                "S3 upload failed"
            );
            Error::provider(NAME, Operation::Upload, DisplayErrorContext(&e).to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            "S3 upload successful"
        );

        let mut metadata = HashMap::from([
            ("backend".to_string(), NAME.to_string()),
            ("bucket".to_string(), self.bucket.clone()),
            ("key".to_string(), key.clone()),
        ]);
        if let Some(etag) = output.e_tag() {
            metadata.insert("etag".to_string(), etag.trim_matches('"').to_string());
        }

        Ok(UploadOutcome {
            url: self.keys.public_url(&key, |k| self.native_url(k)),
            object_key: key,
            size,
            content_type: content_type.map(str::to_string),
            metadata,
        })
    }

    fn deleter(&self) -> Option<&dyn DeleteObject> {
        Some(self)
    }

    fn url_signer(&self) -> Option<&dyn SignDownloadUrl> {
        Some(self)
    }
}

#[async_trait]
impl DeleteObject for S3Backend {
    async fn delete(&self, url: &str) -> Result<()> {
        let key = self.key_from_reference(url)?;

        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => {
                tracing::info!(bucket = %self.bucket, key = %key, "S3 delete successful");
                Ok(())
            }
            Err(e) if e.raw_response().map(|r| r.status().as_u16()) == Some(404) => {
                tracing::warn!(bucket = %self.bucket, key = %key, "S3 object already absent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    error = %DisplayErrorContext(&e),
                    bucket = %self.bucket,
                    key = %key,
                    "S3 delete failed"
                );
                Err(Error::provider(
                    NAME,
                    Operation::Delete,
                    DisplayErrorContext(&e).to_string(),
                ))
            }
        }
    }
}

#[async_trait]
impl SignDownloadUrl for S3Backend {
    async fn download_url(&self, key: &str, expires_in: Duration) -> Result<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| Error::provider(NAME, Operation::DownloadUrl, e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| {
                Error::provider(NAME, Operation::DownloadUrl, DisplayErrorContext(&e).to_string())
            })?;

        Ok(request.uri().to_string())
    }
}
