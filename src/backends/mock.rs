use super::{DeleteObject, SignDownloadUrl, StorageBackend};
use crate::config::BackendKind;
use crate::error::Operation;
use crate::keys::KeyCodec;
use crate::models::UploadOutcome;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const NAME: &str = "Mock Storage";

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

/// In-memory backend for tests. Capabilities can be switched off to exercise
/// the unsupported-operation paths.
#[derive(Clone)]
pub struct MockBackend {
    files: Arc<Mutex<HashMap<String, StoredObject>>>,
    base_url: String,
    keys: KeyCodec,
    kind: BackendKind,
    supports_delete: bool,
    supports_download_url: bool,
    failure: Option<String>,
    upload_count: Arc<Mutex<usize>>,
    delete_count: Arc<Mutex<usize>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            base_url: "https://mock-storage.example.com".to_string(),
            keys: KeyCodec::default(),
            kind: BackendKind::S3,
            supports_delete: true,
            supports_download_url: true,
            failure: None,
            upload_count: Arc::new(Mutex::new(0)),
            delete_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_keys(mut self, prefix: Option<&str>, cdn: Option<&str>) -> Self {
        self.keys = KeyCodec::new(prefix, cdn);
        self
    }

    /// Kind reported through [`StorageBackend::kind`].
    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_file(self, key: String, content: Vec<u8>) -> Self {
        self.files.lock().unwrap().insert(
            key,
            StoredObject {
                data: content,
                content_type: None,
            },
        );
        self
    }

    pub fn without_delete(mut self) -> Self {
        self.supports_delete = false;
        self
    }

    pub fn without_download_url(mut self) -> Self {
        self.supports_download_url = false;
        self
    }

    /// Every provider call fails with `message`.
    pub fn failing_with(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn get_upload_count(&self) -> usize {
        *self.upload_count.lock().unwrap()
    }

    pub fn get_delete_count(&self) -> usize {
        *self.delete_count.lock().unwrap()
    }

    pub fn get_files(&self) -> HashMap<String, StoredObject> {
        self.files.lock().unwrap().clone()
    }

    fn check_failure(&self, operation: Operation) -> Result<()> {
        match &self.failure {
            Some(message) => Err(Error::provider(NAME, operation, message.clone())),
            None => Ok(()),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn upload(
        &self,
        data: &[u8],
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<UploadOutcome> {
        *self.upload_count.lock().unwrap() += 1;
        self.check_failure(Operation::Upload)?;

        let key = self.keys.generate(filename);
        self.files.lock().unwrap().insert(
            key.clone(),
            StoredObject {
                data: data.to_vec(),
                content_type: content_type.map(str::to_string),
            },
        );

        Ok(UploadOutcome {
            url: self
                .keys
                .public_url(&key, |k| format!("{}/{}", self.base_url, k)),
            object_key: key.clone(),
            size: data.len() as u64,
            content_type: content_type.map(str::to_string),
            metadata: HashMap::from([
                ("backend".to_string(), NAME.to_string()),
                ("key".to_string(), key),
            ]),
        })
    }

    fn deleter(&self) -> Option<&dyn DeleteObject> {
        self.supports_delete.then_some(self as &dyn DeleteObject)
    }

    fn url_signer(&self) -> Option<&dyn SignDownloadUrl> {
        self.supports_download_url
            .then_some(self as &dyn SignDownloadUrl)
    }
}

#[async_trait]
impl DeleteObject for MockBackend {
    async fn delete(&self, url: &str) -> Result<()> {
        *self.delete_count.lock().unwrap() += 1;
        self.check_failure(Operation::Delete)?;

        let key = self.keys.key_from_reference(url)?;
        self.files.lock().unwrap().remove(&key);
        Ok(())
    }
}

#[async_trait]
impl SignDownloadUrl for MockBackend {
    async fn download_url(&self, key: &str, expires_in: Duration) -> Result<String> {
        self.check_failure(Operation::DownloadUrl)?;
        Ok(format!(
            "{}/{}?expires={}",
            self.base_url,
            key,
            expires_in.as_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_upload_and_delete() {
        let backend = MockBackend::new();

        let outcome = backend
            .upload(b"hello", "a.txt", Some("text/plain"))
            .await
            .unwrap();
        assert_eq!(
            outcome.url,
            format!("https://mock-storage.example.com/{}", outcome.object_key)
        );
        assert_eq!(backend.get_upload_count(), 1);
        assert_eq!(
            backend.get_files()[&outcome.object_key].content_type.as_deref(),
            Some("text/plain")
        );

        backend.delete(&outcome.url).await.unwrap();
        assert!(backend.get_files().is_empty());

        // Already gone
        backend.delete(&outcome.url).await.unwrap();
        assert_eq!(backend.get_delete_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_capabilities_can_be_disabled() {
        let backend = MockBackend::new().without_delete().without_download_url();
        assert!(backend.deleter().is_none());
        assert!(backend.url_signer().is_none());
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let backend = MockBackend::new().failing_with("boom");
        let err = backend.upload(b"x", "a.txt", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Mock Storage upload failed: boom");
        assert!(backend.get_files().is_empty());
    }

    #[tokio::test]
    async fn test_mock_with_file() {
        let backend = MockBackend::new()
            .with_keys(None, Some("https://cdn.example.com"))
            .with_file("uploads/x.png".to_string(), b"png".to_vec());

        backend
            .delete("https://cdn.example.com/uploads/x.png")
            .await
            .unwrap();
        assert!(backend.get_files().is_empty());
    }
}
