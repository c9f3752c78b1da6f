//! Alibaba Cloud OSS adapter over the REST API with V1 header signing.

use super::{expiry_deadline, http_client, DeleteObject, SignDownloadUrl, StorageBackend};
use crate::config::{BackendKind, OssConfig};
use crate::error::Operation;
use crate::keys::{encode_key, KeyCodec};
use crate::models::UploadOutcome;
use crate::validation::DEFAULT_MIME_TYPE;
use crate::{Error, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, DATE, ETAG};
use reqwest::{Client, Method, StatusCode};
use sha1::Sha1;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

const NAME: &str = "Alibaba Cloud OSS";

type HmacSha1 = Hmac<Sha1>;

pub struct OssBackend {
    http: Client,
    access_key_id: String,
    access_key_secret: String,
    bucket: String,
    base_url: String,
    keys: KeyCodec,
}

impl OssBackend {
    pub fn new(config: &OssConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            http: http_client()?,
            access_key_id: config.access_key_id.clone(),
            access_key_secret: config.access_key_secret.clone(),
            bucket: config.bucket.clone(),
            base_url: bucket_base_url(&config.bucket, &config.region, config.endpoint.as_deref())?,
            keys: KeyCodec::new(config.prefix.as_deref(), config.cdn.as_deref()),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, encode_key(key))
    }

    /// Base64 HMAC-SHA1 over `VERB\nContent-MD5\nContent-Type\nDate\n/bucket/key`.
    /// `date` is the `Date` header for signed requests or the expiry timestamp
    /// for signed URLs.
    fn signature(&self, verb: &Method, content_type: &str, date: &str, key: &str) -> String {
        let string_to_sign = format!(
            "{}\n\n{}\n{}\n/{}/{}",
            verb, content_type, date, self.bucket, key
        );
        let mut mac = HmacSha1::new_from_slice(self.access_key_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(string_to_sign.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    fn authorization(&self, verb: &Method, content_type: &str, date: &str, key: &str) -> String {
        format!(
            "OSS {}:{}",
            self.access_key_id,
            self.signature(verb, content_type, date, key)
        )
    }

    async fn send(
        &self,
        operation: Operation,
        method: Method,
        key: &str,
        content_type: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response> {
        let date = http_date();
        let authorization =
            self.authorization(&method, content_type.unwrap_or_default(), &date, key);

        let mut request = self
            .http
            .request(method, self.object_url(key))
            .header(DATE, &date)
            .header(AUTHORIZATION, authorization);
        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        request.send().await.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                "OSS {} request failed",
                operation
            );
            Error::provider(NAME, operation, e.to_string())
        })
    }
}

/// `https://<bucket>.<region>.aliyuncs.com`, or the bucket as a subdomain of a
/// custom endpoint.
fn bucket_base_url(bucket: &str, region: &str, endpoint: Option<&str>) -> Result<String> {
    let endpoint = endpoint.map(str::trim).filter(|e| !e.is_empty());
    let Some(endpoint) = endpoint else {
        let region = region.trim();
        let region = if region.starts_with("oss-") {
            region.to_string()
        } else {
            format!("oss-{}", region)
        };
        return Ok(format!("https://{}.{}.aliyuncs.com", bucket, region));
    };

    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    };
    let parsed = Url::parse(&with_scheme)
        .map_err(|e| Error::Config(format!("Invalid OSS endpoint '{}': {}", endpoint, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::Config(format!("OSS endpoint '{}' has no host", endpoint)))?;

    Ok(match parsed.port() {
        Some(port) => format!("{}://{}.{}:{}", parsed.scheme(), bucket, host, port),
        None => format!("{}://{}.{}", parsed.scheme(), bucket, host),
    })
}

fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

async fn status_error(operation: Operation, response: reqwest::Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Error::provider(NAME, operation, format!("status {}: {}", status.as_u16(), body))
}

#[async_trait]
impl StorageBackend for OssBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::AlibabaOss
    }

    async fn upload(
        &self,
        data: &[u8],
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<UploadOutcome> {
        let key = self.keys.generate(filename);
        let response = self
            .send(
                Operation::Upload,
                Method::PUT,
                &key,
                Some(content_type.unwrap_or(DEFAULT_MIME_TYPE)),
                Some(data.to_vec()),
            )
            .await?;

        if !response.status().is_success() {
            tracing::error!(
                status = response.status().as_u16(),
                bucket = %self.bucket,
                key = %key,
                "OSS upload rejected"
            );
            return Err(status_error(Operation::Upload, response).await);
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = data.len(),
            "OSS upload successful"
        );

        let mut metadata = HashMap::from([
            ("backend".to_string(), NAME.to_string()),
            ("bucket".to_string(), self.bucket.clone()),
            ("key".to_string(), key.clone()),
        ]);
        if let Some(etag) = response.headers().get(ETAG).and_then(|v| v.to_str().ok()) {
            metadata.insert("etag".to_string(), etag.trim_matches('"').to_string());
        }

        Ok(UploadOutcome {
            url: self.keys.public_url(&key, |k| self.object_url(k)),
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
impl DeleteObject for OssBackend {
    async fn delete(&self, url: &str) -> Result<()> {
        let key = self.keys.key_from_reference(url)?;
        let response = self
            .send(Operation::Delete, Method::DELETE, &key, None, None)
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                tracing::warn!(bucket = %self.bucket, key = %key, "OSS object already absent");
                Ok(())
            }
            status if status.is_success() => {
                tracing::info!(bucket = %self.bucket, key = %key, "OSS delete successful");
                Ok(())
            }
            _ => Err(status_error(Operation::Delete, response).await),
        }
    }
}

#[async_trait]
impl SignDownloadUrl for OssBackend {
    async fn download_url(&self, key: &str, expires_in: Duration) -> Result<String> {
        let expires = expiry_deadline(expires_in).ok_or_else(|| {
            Error::provider(
                NAME,
                Operation::DownloadUrl,
                format!("expiration of {}s is out of range", expires_in.as_secs()),
            )
        })?;
        let signature = self.signature(&Method::GET, "", &expires.to_string(), key);
        Ok(format!(
            "{}?OSSAccessKeyId={}&Expires={}&Signature={}",
            self.object_url(key),
            urlencoding::encode(&self.access_key_id),
            expires,
            urlencoding::encode(&signature)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> OssConfig {
        OssConfig {
            access_key_id: "oss-id".to_string(),
            access_key_secret: "oss-secret".to_string(),
            bucket: "test-bucket".to_string(),
            region: "cn-hangzhou".to_string(),
            endpoint: None,
            prefix: None,
            cdn: None,
        }
    }

    fn backend(server: &MockServer) -> OssBackend {
        OssBackend::new(&config()).unwrap().with_base_url(server.uri())
    }

    #[test]
    fn test_base_url_from_region() {
        assert_eq!(
            bucket_base_url("b", "cn-hangzhou", None).unwrap(),
            "https://b.oss-cn-hangzhou.aliyuncs.com"
        );
        assert_eq!(
            bucket_base_url("b", "oss-cn-beijing", None).unwrap(),
            "https://b.oss-cn-beijing.aliyuncs.com"
        );
    }

    #[test]
    fn test_base_url_from_endpoint() {
        assert_eq!(
            bucket_base_url("b", "cn-hangzhou", Some("oss-accelerate.aliyuncs.com")).unwrap(),
            "https://b.oss-accelerate.aliyuncs.com"
        );
        assert_eq!(
            bucket_base_url("b", "cn-hangzhou", Some("http://oss.internal:8080/")).unwrap(),
            "http://b.oss.internal:8080"
        );
    }

    #[test]
    fn test_header_signature_known_vector() {
        let backend = OssBackend::new(&config()).unwrap();
        assert_eq!(
            backend.authorization(
                &Method::PUT,
                "text/plain",
                "Wed, 28 May 2025 10:00:00 GMT",
                "uploads/a.txt"
            ),
            "OSS oss-id:l9IkVwfX7t/kcqknmLzEeKTzciI="
        );
    }

    #[test]
    fn test_url_signature_known_vector() {
        let backend = OssBackend::new(&config()).unwrap();
        assert_eq!(
            backend.signature(&Method::GET, "", "1700000000", "uploads/a.txt"),
            "1YXlLw8sioMtbJHHwDk2/i2uieM="
        );
    }

    #[tokio::test]
    async fn test_upload_success() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/uploads/\d{4}-\d{2}-\d{2}/[0-9a-f-]{36}\.pdf$"))
            .and(header("Content-Type", "application/pdf"))
            .and(header_exists("Authorization"))
            .and(header_exists("Date"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"ABC123\""))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server);
        let outcome = backend
            .upload(b"%PDF-1.4", "report.pdf", Some("application/pdf"))
            .await
            .unwrap();

        assert_eq!(outcome.url, format!("{}/{}", server.uri(), outcome.object_key));
        assert_eq!(outcome.metadata["etag"], "ABC123");
        assert_eq!(outcome.metadata["bucket"], "test-bucket");
        assert_eq!(outcome.size, 8);
    }

    #[tokio::test]
    async fn test_upload_uses_cdn_and_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut cfg = config();
        cfg.prefix = Some("tenant".to_string());
        cfg.cdn = Some("https://cdn.example.com".to_string());
        let backend = OssBackend::new(&cfg).unwrap().with_base_url(server.uri());

        let outcome = backend.upload(b"x", "a.png", None).await.unwrap();
        assert!(outcome.object_key.starts_with("tenant/uploads/"));
        assert_eq!(
            outcome.url,
            format!("https://cdn.example.com/{}", outcome.object_key)
        );
    }

    #[tokio::test]
    async fn test_upload_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string("<Code>AccessDenied</Code>"))
            .mount(&server)
            .await;

        let err = backend(&server)
            .upload(b"x", "a.txt", None)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Alibaba Cloud OSS upload failed: status 403: <Code>AccessDenied</Code>"
        );
    }

    #[tokio::test]
    async fn test_delete_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/uploads/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/uploads/ok.png"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/uploads/locked.png"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let backend = backend(&server);
        backend
            .delete(&format!("{}/uploads/ok.png", server.uri()))
            .await
            .unwrap();
        backend.delete("uploads/gone.png").await.unwrap();
        assert!(backend.delete("uploads/locked.png").await.is_err());
    }

    #[tokio::test]
    async fn test_download_url_query() {
        let backend = OssBackend::new(&config()).unwrap();
        let url = backend
            .download_url("uploads/a.txt", Duration::from_secs(3600))
            .await
            .unwrap();

        let parsed = Url::parse(&url).unwrap();
        assert_eq!(
            parsed.host_str(),
            Some("test-bucket.oss-cn-hangzhou.aliyuncs.com")
        );
        assert_eq!(parsed.path(), "/uploads/a.txt");

        let query: HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(query["OSSAccessKeyId"], "oss-id");
        let expires = &query["Expires"];
        assert_eq!(
            query["Signature"],
            backend.signature(&Method::GET, "", expires, "uploads/a.txt")
        );
        let expires: i64 = expires.parse().unwrap();
        assert!(expires > chrono::Utc::now().timestamp() + 3500);
    }

    #[tokio::test]
    async fn test_download_url_rejects_out_of_range_expiration() {
        let backend = OssBackend::new(&config()).unwrap();
        for seconds in [u64::MAX / 2, u64::MAX] {
            let err = backend
                .download_url("k", Duration::from_secs(seconds))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                Error::Provider {
                    operation: Operation::DownloadUrl,
                    ..
                }
            ));
        }
    }
}
