//! Object key naming and URL construction shared by every backend.
//!
//! Keys have the shape `[<prefix>/]uploads/<YYYY-MM-DD>/<uuid>.<ext>`. Recovering a
//! key from a URL is best effort: it is only correct when the URL path mirrors the
//! key layout, so callers that still hold the key should pass it directly.

use crate::validation::file_extension;
use crate::{Error, Result};
use chrono::{NaiveDate, Utc};
use url::Url;
use uuid::Uuid;

/// Key generation and URL policy for one backend instance.
///
/// A filename without an extension yields a key ending in the bare uuid, with no
/// trailing dot: `uploads/2024-01-01/<uuid>`.
#[derive(Debug, Clone, Default)]
pub struct KeyCodec {
    prefix: Option<String>,
    cdn: Option<String>,
}

impl KeyCodec {
    pub fn new(prefix: Option<&str>, cdn: Option<&str>) -> Self {
        let prefix = prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());
        let cdn = cdn
            .map(|c| c.trim_end_matches('/').to_string())
            .filter(|c| !c.is_empty());
        Self { prefix, cdn }
    }

    pub fn cdn(&self) -> Option<&str> {
        self.cdn.as_deref()
    }

    /// A fresh key for `filename`, dated with the current UTC day.
    pub fn generate(&self, filename: &str) -> String {
        self.generate_on(filename, Utc::now().date_naive())
    }

    pub fn generate_on(&self, filename: &str, date: NaiveDate) -> String {
        let extension = file_extension(filename);
        let name = if extension.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            format!("{}.{}", Uuid::new_v4(), extension)
        };
        let base = format!("uploads/{}/{}", date.format("%Y-%m-%d"), name);

        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, base),
            None => base,
        }
    }

    /// The externally visible URL for `key`: the CDN when configured, else the
    /// provider's own address produced by `native`.
    pub fn public_url<F>(&self, key: &str, native: F) -> String
    where
        F: FnOnce(&str) -> String,
    {
        match &self.cdn {
            Some(cdn) => format!("{}/{}", cdn, encode_key(key)),
            None => native(key),
        }
    }

    /// Recovers the object key from a URL previously returned by an upload, or
    /// accepts a bare key as-is.
    pub fn key_from_reference(&self, reference: &str) -> Result<String> {
        if let Some(cdn) = &self.cdn {
            if let Some(rest) = reference
                .strip_prefix(cdn.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
            {
                let raw = rest.split(['?', '#']).next().unwrap_or_default();
                let key = decode_path(raw, reference)?;
                tracing::debug!(key = %key, "Recovered key from CDN URL");
                return non_empty(key, reference);
            }
        }
        extract_key(reference)
    }
}

/// Takes the path of `url` without its leading separator. Input that does not
/// parse as an absolute URL is treated as the key itself.
pub fn extract_key(url: &str) -> Result<String> {
    match Url::parse(url) {
        Ok(parsed) => {
            let path = parsed.path();
            let path = path.strip_prefix('/').unwrap_or(path);
            non_empty(decode_path(path, url)?, url)
        }
        Err(_) => {
            let key = url.strip_prefix('/').unwrap_or(url);
            non_empty(key.to_string(), url)
        }
    }
}

/// Percent-encodes each `/` separated segment of `key` for use in a URL path.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn decode_path(path: &str, reference: &str) -> Result<String> {
    urlencoding::decode(path)
        .map(|key| key.into_owned())
        .map_err(|e| Error::InvalidKey(format!("'{}' is not valid UTF-8: {}", reference, e)))
}

fn non_empty(key: String, reference: &str) -> Result<String> {
    if key.trim().is_empty() {
        return Err(Error::InvalidKey(format!(
            "no object key found in '{}'",
            reference
        )));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn assert_key_shape(key: &str, expected_prefix: &str, extension: &str) {
        let rest = key
            .strip_prefix(expected_prefix)
            .unwrap_or_else(|| panic!("{} does not start with {}", key, expected_prefix));
        let (id, ext) = rest.rsplit_once('.').unwrap();
        assert!(Uuid::parse_str(id).is_ok(), "{} is not a uuid", id);
        assert_eq!(ext, extension);
    }

    #[test]
    fn test_generate_shape() {
        let codec = KeyCodec::default();
        let key = codec.generate_on("Photo.PNG", date());
        assert_key_shape(&key, "uploads/2024-01-01/", "png");
    }

    #[test]
    fn test_generate_with_prefix_strips_slashes() {
        let codec = KeyCodec::new(Some("/tenant-a/"), None);
        let key = codec.generate_on("a.txt", date());
        assert_key_shape(&key, "tenant-a/uploads/2024-01-01/", "txt");
    }

    #[test]
    fn test_generate_without_extension() {
        let key = KeyCodec::default().generate_on("README", date());
        let id = key.strip_prefix("uploads/2024-01-01/").unwrap();
        assert!(!key.ends_with('.'));
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn test_generate_is_unique() {
        let codec = KeyCodec::new(Some("p"), None);
        let keys: HashSet<String> = (0..10_000).map(|_| codec.generate("f.bin")).collect();
        assert_eq!(keys.len(), 10_000);
        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        assert!(keys
            .iter()
            .all(|k| k.starts_with(&format!("p/uploads/{}/", today)) && k.ends_with(".bin")));
    }

    #[test]
    fn test_public_url_prefers_cdn() {
        let codec = KeyCodec::new(None, Some("https://cdn.example.com/"));
        let url = codec.public_url("uploads/2024-01-01/abc.png", |_| {
            panic!("native URL must not be built when a CDN is configured")
        });
        assert_eq!(url, "https://cdn.example.com/uploads/2024-01-01/abc.png");
    }

    #[test]
    fn test_public_url_falls_back_to_native() {
        let codec = KeyCodec::default();
        let url = codec.public_url("k.png", |key| format!("https://bucket.example.com/{}", key));
        assert_eq!(url, "https://bucket.example.com/k.png");
    }

    #[test]
    fn test_extract_key_from_url() {
        assert_eq!(
            extract_key("https://bucket.s3.us-east-1.amazonaws.com/uploads/2024-01-01/abc.png")
                .unwrap(),
            "uploads/2024-01-01/abc.png"
        );
        assert_eq!(
            extract_key("https://example.com/uploads/my%20file.png?x=1").unwrap(),
            "uploads/my file.png"
        );
    }

    #[test]
    fn test_extract_key_falls_back_to_input() {
        assert_eq!(
            extract_key("uploads/2024-01-01/abc.png").unwrap(),
            "uploads/2024-01-01/abc.png"
        );
        assert_eq!(extract_key("/uploads/a.png").unwrap(), "uploads/a.png");
    }

    #[test]
    fn test_extract_key_rejects_empty_path() {
        assert!(matches!(
            extract_key("https://example.com/"),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(extract_key(""), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_key_from_reference_strips_cdn_base_path() {
        let codec = KeyCodec::new(None, Some("https://cdn.example.com/assets"));
        assert_eq!(
            codec
                .key_from_reference("https://cdn.example.com/assets/uploads/2024-01-01/abc.png")
                .unwrap(),
            "uploads/2024-01-01/abc.png"
        );
        // Not under the CDN base: generic extraction
        assert_eq!(
            codec
                .key_from_reference("https://other.example.com/uploads/x.png")
                .unwrap(),
            "uploads/x.png"
        );
    }

    #[test]
    fn test_key_from_reference_decodes_both_paths() {
        let codec = KeyCodec::new(None, Some("https://cdn.example.com"));
        assert_eq!(
            codec
                .key_from_reference("https://cdn.example.com/uploads/my%20file.png?v=2")
                .unwrap(),
            "uploads/my file.png"
        );
        assert_eq!(
            codec
                .key_from_reference("https://bucket.example.com/uploads/my%20file.png")
                .unwrap(),
            "uploads/my file.png"
        );
        assert!(matches!(
            codec.key_from_reference("https://cdn.example.com/uploads/%FF.png"),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_encode_key_keeps_separators() {
        assert_eq!(
            encode_key("tenant/uploads/2024-01-01/a b%.png"),
            "tenant/uploads/2024-01-01/a%20b%25.png"
        );
    }
}
