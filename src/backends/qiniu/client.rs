//! Qiniu transport and request signing.
//!
//! Uploads and bucket management calls report completion through a callback that
//! fires once, after the HTTP exchange resolves, the same way the provider SDK does.

use super::Zone;
use crate::Result;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use sha1::Sha1;
use std::time::Duration;

type HmacSha1 = Hmac<Sha1>;

/// Access/secret key pair used to sign tokens and management requests.
pub struct Credentials {
    access_key: String,
    secret_key: String,
}

impl Credentials {
    pub fn new(access_key: &str, secret_key: &str) -> Self {
        Self {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    /// `<access_key>:<urlsafe_base64(hmac_sha1(secret_key, data))>`
    pub fn sign(&self, data: &[u8]) -> String {
        let mut mac = HmacSha1::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(data);
        let digest = mac.finalize().into_bytes();
        format!("{}:{}", self.access_key, URL_SAFE.encode(digest))
    }

    /// Signs the URL-safe base64 form of `data` and appends it to the token.
    pub fn sign_with_data(&self, data: &[u8]) -> String {
        let encoded = URL_SAFE.encode(data);
        format!("{}:{}", self.sign(encoded.as_bytes()), encoded)
    }

    /// `QBox` authorization for management API requests.
    pub fn management_authorization(&self, path: &str, body: &[u8]) -> String {
        let mut data = Vec::with_capacity(path.len() + 1 + body.len());
        data.extend_from_slice(path.as_bytes());
        data.push(b'\n');
        data.extend_from_slice(body);
        format!("QBox {}", self.sign(&data))
    }
}

#[derive(Debug, Serialize)]
pub struct PutPolicy {
    scope: String,
    deadline: i64,
    #[serde(rename = "returnBody")]
    return_body: String,
}

impl PutPolicy {
    pub fn new(bucket: &str, ttl: Duration, return_body: &str) -> Self {
        Self {
            scope: bucket.to_string(),
            deadline: chrono::Utc::now()
                .timestamp()
                .saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
            return_body: return_body.to_string(),
        }
    }

    pub fn upload_token(&self, credentials: &Credentials) -> Result<String> {
        let policy = serde_json::to_vec(self)?;
        Ok(credentials.sign_with_data(&policy))
    }
}

/// Status code and decoded body of a finished Qiniu request.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    pub status_code: u16,
    pub body: serde_json::Value,
}

pub type Completion = std::result::Result<ResponseInfo, reqwest::Error>;

pub struct QiniuClient {
    http: Client,
    up_host: String,
    rs_host: String,
}

impl QiniuClient {
    pub fn new(http: Client, zone: Zone) -> Self {
        Self {
            http,
            up_host: zone.upload_host().to_string(),
            rs_host: zone.rs_host().to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_hosts(mut self, up_host: String, rs_host: String) -> Self {
        self.up_host = up_host;
        self.rs_host = rs_host;
        self
    }

    /// Form upload of `data` under `key`; `callback` receives the outcome.
    pub fn put<F>(
        &self,
        upload_token: &str,
        key: &str,
        data: Vec<u8>,
        mime_type: Option<&str>,
        callback: F,
    ) where
        F: FnOnce(Completion) + Send + 'static,
    {
        let file = Part::bytes(data).file_name(key.to_string());
        let file = match mime_type {
            Some(mime) => match file.mime_str(mime) {
                Ok(file) => file,
                Err(e) => return callback(Err(e)),
            },
            None => file,
        };

        let form = Form::new()
            .text("token", upload_token.to_string())
            .text("key", key.to_string())
            .part("file", file);
        let request = self.http.post(&self.up_host).multipart(form);

        tokio::spawn(async move { callback(complete(request).await) });
    }

    /// Deletes `bucket:key`; `callback` receives the outcome.
    pub fn delete<F>(&self, credentials: &Credentials, bucket: &str, key: &str, callback: F)
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        let path = format!("/delete/{}", encoded_entry(bucket, key));
        let request = self
            .http
            .post(format!("{}{}", self.rs_host, path))
            .header(AUTHORIZATION, credentials.management_authorization(&path, b""))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");

        tokio::spawn(async move { callback(complete(request).await) });
    }
}

/// URL-safe base64 of `<bucket>:<key>`, as management paths expect.
pub fn encoded_entry(bucket: &str, key: &str) -> String {
    URL_SAFE.encode(format!("{}:{}", bucket, key))
}

async fn complete(request: RequestBuilder) -> Completion {
    let response = request.send().await?;
    let status_code = response.status().as_u16();
    let text = response.text().await?;
    let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
    Ok(ResponseInfo { status_code, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_known_vector() {
        let credentials = Credentials::new("access-key", "secret-key");
        assert_eq!(
            credentials.sign(b"hello qiniu"),
            "access-key:kArPQZJJwtfXQ4-CPlkpKl5okBk="
        );
    }

    #[test]
    fn test_upload_token_layout() {
        let credentials = Credentials::new("ak", "sk");
        let policy = PutPolicy::new("my-bucket", Duration::from_secs(3600), "{}");
        let token = policy.upload_token(&credentials).unwrap();

        let parts: Vec<&str> = token.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ak");

        let decoded = URL_SAFE.decode(parts[2]).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(json["scope"], "my-bucket");
        assert!(json["deadline"].as_i64().unwrap() > chrono::Utc::now().timestamp());
        assert_eq!(json["returnBody"], "{}");

        // The signature covers the encoded policy
        assert_eq!(
            format!("{}:{}", parts[0], parts[1]),
            credentials.sign(parts[2].as_bytes())
        );
    }

    #[test]
    fn test_put_policy_deadline_saturates() {
        let policy = PutPolicy::new("my-bucket", Duration::from_secs(u64::MAX), "{}");
        assert_eq!(policy.deadline, i64::MAX);
    }

    #[test]
    fn test_management_authorization_format() {
        let credentials = Credentials::new("ak", "sk");
        let auth = credentials.management_authorization("/delete/abc", b"");
        assert_eq!(
            auth,
            format!("QBox {}", credentials.sign(b"/delete/abc\n"))
        );
    }

    #[test]
    fn test_encoded_entry() {
        assert_eq!(
            URL_SAFE.decode(encoded_entry("bucket", "uploads/a.png")).unwrap(),
            b"bucket:uploads/a.png"
        );
    }
}
