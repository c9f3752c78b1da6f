//! Qiniu Kodo adapter.

pub mod client;

pub use client::{Credentials, PutPolicy, QiniuClient, ResponseInfo};

use super::{expiry_deadline, http_client, DeleteObject, SignDownloadUrl, StorageBackend};
use crate::config::{BackendKind, QiniuConfig};
use crate::error::Operation;
use crate::keys::{encode_key, KeyCodec};
use crate::models::UploadOutcome;
use crate::{Error, Result};
use async_trait::async_trait;
use client::Completion;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;

const NAME: &str = "Qiniu Cloud Storage";

const UPLOAD_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Qiniu's "no such file or directory" status.
const STATUS_NOT_FOUND: u16 = 612;

const RETURN_BODY: &str =
    r#"{"key":"$(key)","hash":"$(etag)","fsize":$(fsize),"bucket":"$(bucket)","name":"$(x:name)"}"#;

/// Storage regions. Unknown zone codes fall back to [`Zone::Z0`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zone {
    /// East China
    #[default]
    Z0,
    /// North China
    Z1,
    /// South China
    Z2,
    /// North America
    Na0,
    /// Southeast Asia
    As0,
}

impl Zone {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "z0" => Some(Zone::Z0),
            "z1" => Some(Zone::Z1),
            "z2" => Some(Zone::Z2),
            "na0" => Some(Zone::Na0),
            "as0" => Some(Zone::As0),
            _ => None,
        }
    }

    pub fn resolve(code: Option<&str>) -> Self {
        match code {
            Some(code) => Zone::from_code(code).unwrap_or_else(|| {
                tracing::warn!("Unknown Qiniu zone '{}', using z0", code);
                Zone::default()
            }),
            None => Zone::default(),
        }
    }

    pub fn upload_host(self) -> &'static str {
        match self {
            Zone::Z0 => "https://upload.qiniup.com",
            Zone::Z1 => "https://upload-z1.qiniup.com",
            Zone::Z2 => "https://upload-z2.qiniup.com",
            Zone::Na0 => "https://upload-na0.qiniup.com",
            Zone::As0 => "https://upload-as0.qiniup.com",
        }
    }

    pub fn rs_host(self) -> &'static str {
        match self {
            Zone::Z0 => "https://rs-z0.qiniuapi.com",
            Zone::Z1 => "https://rs-z1.qiniuapi.com",
            Zone::Z2 => "https://rs-z2.qiniuapi.com",
            Zone::Na0 => "https://rs-na0.qiniuapi.com",
            Zone::As0 => "https://rs-as0.qiniuapi.com",
        }
    }
}

pub struct QiniuBackend {
    client: QiniuClient,
    credentials: Credentials,
    bucket: String,
    domain: String,
    zone: Zone,
    keys: KeyCodec,
}

impl QiniuBackend {
    pub fn new(config: &QiniuConfig) -> Result<Self> {
        config.validate()?;

        let zone = Zone::resolve(config.zone.as_deref());

        Ok(Self {
            client: QiniuClient::new(http_client()?, zone),
            credentials: Credentials::new(&config.access_key, &config.secret_key),
            bucket: config.bucket.clone(),
            domain: normalize_domain(&config.domain),
            zone,
            keys: KeyCodec::new(config.prefix.as_deref(), config.cdn.as_deref()),
        })
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    #[cfg(test)]
    fn with_hosts(mut self, up_host: String, rs_host: String) -> Self {
        self.client = self.client.with_hosts(up_host, rs_host);
        self
    }

    fn domain_url(&self, key: &str) -> String {
        format!("{}/{}", self.domain, key)
    }
}

/// Bound domains are often configured without a scheme.
fn normalize_domain(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('/');
    if domain.contains("://") {
        domain.to_string()
    } else {
        format!("https://{}", domain)
    }
}

/// Resolves exactly once: with the callback's outcome, or with a failure if the
/// callback was dropped without running.
async fn await_completion(
    receiver: oneshot::Receiver<Completion>,
    operation: Operation,
) -> Result<ResponseInfo> {
    receiver
        .await
        .map_err(|_| Error::provider(NAME, operation, "request ended without a result"))?
        .map_err(|e| Error::provider(NAME, operation, e.to_string()))
}

#[async_trait]
impl StorageBackend for QiniuBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Qiniu
    }

    async fn upload(
        &self,
        data: &[u8],
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<UploadOutcome> {
        let key = self.keys.generate(filename);
        let token = PutPolicy::new(&self.bucket, UPLOAD_TOKEN_TTL, RETURN_BODY)
            .upload_token(&self.credentials)?;

        let (sender, receiver) = oneshot::channel();
        self.client
            .put(&token, &key, data.to_vec(), content_type, move |completion| {
                let _ = sender.send(completion);
            });
        let info = await_completion(receiver, Operation::Upload).await?;

        if info.status_code != 200 {
            tracing::error!(
                status = info.status_code,
                bucket = %self.bucket,
                key = %key,
                "Qiniu upload rejected"
            );
            return Err(Error::provider(
                NAME,
                Operation::Upload,
                format!("status {}: {}", info.status_code, info.body),
            ));
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = data.len(),
            "Qiniu upload successful"
        );

        let mut metadata = HashMap::from([
            ("backend".to_string(), NAME.to_string()),
            ("bucket".to_string(), self.bucket.clone()),
            ("key".to_string(), key.clone()),
        ]);
        if let Some(hash) = info.body.get("hash").and_then(serde_json::Value::as_str) {
            metadata.insert("hash".to_string(), hash.to_string());
        }

        Ok(UploadOutcome {
            url: self.keys.public_url(&key, |k| self.domain_url(&encode_key(k))),
            object_key: key,
            size: data.len() as u64,
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
impl DeleteObject for QiniuBackend {
    async fn delete(&self, url: &str) -> Result<()> {
        let key = self.keys.key_from_reference(url)?;

        let (sender, receiver) = oneshot::channel();
        self.client
            .delete(&self.credentials, &self.bucket, &key, move |completion| {
                let _ = sender.send(completion);
            });
        let info = await_completion(receiver, Operation::Delete).await?;

        match info.status_code {
            200 => {
                tracing::info!(bucket = %self.bucket, key = %key, "Qiniu delete successful");
                Ok(())
            }
            STATUS_NOT_FOUND => {
                tracing::warn!(bucket = %self.bucket, key = %key, "Qiniu object already absent");
                Ok(())
            }
            status => Err(Error::provider(
                NAME,
                Operation::Delete,
                format!("status {}: {}", status, info.body),
            )),
        }
    }
}

#[async_trait]
impl SignDownloadUrl for QiniuBackend {
    /// Private-bucket download URL; public buckets ignore the token.
    async fn download_url(&self, key: &str, expires_in: Duration) -> Result<String> {
        let deadline = expiry_deadline(expires_in).ok_or_else(|| {
            Error::provider(
                NAME,
                Operation::DownloadUrl,
                format!("expiration of {}s is out of range", expires_in.as_secs()),
            )
        })?;
        let unsigned = format!("{}?e={}", self.domain_url(&encode_key(key)), deadline);
        let token = self.credentials.sign(unsigned.as_bytes());
        Ok(format!("{}&token={}", unsigned, token))
    }
}
