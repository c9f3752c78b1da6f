//! Storage configuration
//!
//! Defines the discriminated backend configuration consumed by the backend
//! factory and loads it from a JSON file or from environment variables.

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_EXPIRATION_SECONDS: u64 = 3600;

/// Environment variable naming a JSON config file.
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

/// Discriminant of [`BackendDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    S3,
    Qiniu,
    AlibabaOss,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::S3, BackendKind::Qiniu, BackendKind::AlibabaOss];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::S3 => "aws-s3",
            BackendKind::Qiniu => "qiniu",
            BackendKind::AlibabaOss => "alibaba-oss",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnsupportedBackend(s.to_string()))
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub bucket: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub cdn: Option<String>,
    /// Uploads are sent with the `public-read` canned ACL unless disabled.
    #[serde(default = "default_true")]
    pub public_read: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QiniuConfig {
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub domain: String,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub cdn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OssConfig {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub cdn: Option<String>,
}

/// Provider selection plus its credentials; exactly one variant per process.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum BackendDescriptor {
    #[serde(rename = "aws-s3")]
    S3(S3Config),
    #[serde(rename = "qiniu")]
    Qiniu(QiniuConfig),
    #[serde(rename = "alibaba-oss")]
    AlibabaOss(OssConfig),
}

fn require(kind: BackendKind, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!(
            "{} backend requires a non-empty '{}'",
            kind, field
        )));
    }
    Ok(())
}

impl S3Config {
    pub fn validate(&self) -> Result<()> {
        let kind = BackendKind::S3;
        require(kind, "accessKeyId", &self.access_key_id)?;
        require(kind, "secretAccessKey", &self.secret_access_key)?;
        require(kind, "region", &self.region)?;
        require(kind, "bucket", &self.bucket)
    }
}

impl QiniuConfig {
    pub fn validate(&self) -> Result<()> {
        let kind = BackendKind::Qiniu;
        require(kind, "accessKey", &self.access_key)?;
        require(kind, "secretKey", &self.secret_key)?;
        require(kind, "bucket", &self.bucket)?;
        require(kind, "domain", &self.domain)
    }
}

impl OssConfig {
    pub fn validate(&self) -> Result<()> {
        let kind = BackendKind::AlibabaOss;
        require(kind, "accessKeyId", &self.access_key_id)?;
        require(kind, "accessKeySecret", &self.access_key_secret)?;
        require(kind, "bucket", &self.bucket)?;
        require(kind, "region", &self.region)
    }
}

impl BackendDescriptor {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendDescriptor::S3(_) => BackendKind::S3,
            BackendDescriptor::Qiniu(_) => BackendKind::Qiniu,
            BackendDescriptor::AlibabaOss(_) => BackendKind::AlibabaOss,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            BackendDescriptor::S3(config) => config.validate(),
            BackendDescriptor::Qiniu(config) => config.validate(),
            BackendDescriptor::AlibabaOss(config) => config.validate(),
        }
    }

    /// Parses a raw JSON descriptor, checking the `type` discriminant first so an
    /// unknown provider is reported as such rather than as a schema mismatch.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::Config("backend.type is required".to_string()))?;
        kind.parse::<BackendKind>()?;

        serde_json::from_value(value.clone())
            .map_err(|e| Error::Config(format!("Invalid {} backend configuration: {}", kind, e)))
    }
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_expiration() -> u64 {
    DEFAULT_EXPIRATION_SECONDS
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    pub backend: BackendDescriptor,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default)]
    pub allowed_mime_types: Option<Vec<String>>,
    #[serde(default = "default_expiration", alias = "expirationTime")]
    pub download_url_expiration_seconds: u64,
}

impl StorageConfig {
    pub fn new(backend: BackendDescriptor) -> Self {
        Self {
            backend,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_mime_types: None,
            download_url_expiration_seconds: DEFAULT_EXPIRATION_SECONDS,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(Error::Config("maxFileSize must be positive".to_string()));
        }
        if self.download_url_expiration_seconds == 0 {
            return Err(Error::Config(
                "downloadUrlExpirationSeconds must be positive".to_string(),
            ));
        }
        self.backend.validate()
    }

    /// Loads configuration with priority: explicit file path, then the file named by
    /// `CONFIG_FILE`, then individual environment variables.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let candidate = config_file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from));

        match candidate {
            Some(path) if path.exists() => Self::from_file(&path),
            Some(path) => {
                tracing::warn!(
                    "Config file {} not found, falling back to environment variables",
                    path.display()
                );
                Self::from_env()
            }
            None => Self::from_env(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to load config from file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_json(&content)?;
        tracing::info!("Loaded storage configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("Malformed config JSON: {}", e)))?;

        let backend = raw
            .get("backend")
            .ok_or_else(|| Error::Config("backend section is required".to_string()))?;
        BackendDescriptor::from_value(backend)?;

        let config: StorageConfig = serde_json::from_value(raw)
            .map_err(|e| Error::Config(format!("Invalid storage configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &str| var(name).unwrap_or_default();

        let kind: BackendKind = var("CLOUD_STORAGE_BACKEND")
            .ok_or_else(|| {
                Error::Config("CLOUD_STORAGE_BACKEND environment variable is required".to_string())
            })?
            .parse()?;

        let backend = match kind {
            BackendKind::S3 => BackendDescriptor::S3(S3Config {
                access_key_id: required("AWS_ACCESS_KEY_ID"),
                secret_access_key: required("AWS_SECRET_ACCESS_KEY"),
                region: var("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                bucket: required("AWS_S3_BUCKET"),
                endpoint: var("AWS_S3_ENDPOINT"),
                prefix: var("AWS_S3_PREFIX"),
                cdn: var("AWS_S3_CDN"),
                public_read: match var("AWS_S3_PUBLIC_READ") {
                    Some(value) => parse_bool("AWS_S3_PUBLIC_READ", &value)?,
                    None => true,
                },
            }),
            BackendKind::Qiniu => BackendDescriptor::Qiniu(QiniuConfig {
                access_key: required("QINIU_ACCESS_KEY"),
                secret_key: required("QINIU_SECRET_KEY"),
                bucket: required("QINIU_BUCKET"),
                domain: required("QINIU_DOMAIN"),
                zone: var("QINIU_ZONE"),
                prefix: var("QINIU_PREFIX"),
                cdn: var("QINIU_CDN"),
            }),
            BackendKind::AlibabaOss => BackendDescriptor::AlibabaOss(OssConfig {
                access_key_id: required("ALIBABA_ACCESS_KEY_ID"),
                access_key_secret: required("ALIBABA_ACCESS_KEY_SECRET"),
                bucket: required("ALIBABA_OSS_BUCKET"),
                region: required("ALIBABA_OSS_REGION"),
                endpoint: var("ALIBABA_OSS_ENDPOINT"),
                prefix: var("ALIBABA_OSS_PREFIX"),
                cdn: var("ALIBABA_OSS_CDN"),
            }),
        };

        let config = StorageConfig {
            backend,
            max_file_size: match var("MAX_FILE_SIZE") {
                Some(value) => parse_number("MAX_FILE_SIZE", &value)?,
                None => DEFAULT_MAX_FILE_SIZE,
            },
            allowed_mime_types: var("ALLOWED_MIME_TYPES").map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
            download_url_expiration_seconds: match var("EXPIRATION_TIME") {
                Some(value) => parse_number("EXPIRATION_TIME", &value)?,
                None => DEFAULT_EXPIRATION_SECONDS,
            },
        };

        config.validate()?;
        Ok(config)
    }
}

fn parse_number(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a positive integer, got '{}'", name, value)))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(Error::Config(format!(
            "{} must be a boolean, got '{}'",
            name, value
        ))),
    }
}
