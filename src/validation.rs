//! Pre-flight checks applied to every upload before any network call,
//! plus extension based MIME type inference.

use crate::config::StorageConfig;
use thiserror::Error;

pub const MAX_FILENAME_LENGTH: usize = 255;

const FORBIDDEN_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File size {size} bytes exceeds maximum allowed size of {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Content type '{content_type}' is not allowed. Allowed types: {}", .allowed.join(", "))]
    MimeNotAllowed {
        content_type: String,
        allowed: Vec<String>,
    },

    #[error("Filename cannot be empty")]
    EmptyFilename,

    #[error("Filename contains invalid characters")]
    InvalidFilename,

    #[error("Filename is too long ({length} characters, maximum {MAX_FILENAME_LENGTH})")]
    FilenameTooLong { length: usize },

    #[error("Expiration must be a positive number of seconds")]
    InvalidExpiration,
}

/// Validates candidate uploads against the limits of a [`StorageConfig`].
#[derive(Debug, Clone)]
pub struct FileValidator {
    max_file_size: u64,
    allowed_mime_types: Option<Vec<String>>,
}

impl FileValidator {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            allowed_mime_types: config.allowed_mime_types.clone(),
        }
    }

    /// Runs the size, MIME and filename checks in that order.
    pub fn validate(
        &self,
        data: &[u8],
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<(), ValidationError> {
        self.validate_size(data)?;
        self.validate_mime_type(content_type)?;
        validate_filename(filename)
    }

    fn validate_size(&self, data: &[u8]) -> Result<(), ValidationError> {
        let size = data.len() as u64;
        if size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }
        Ok(())
    }

    fn validate_mime_type(&self, content_type: Option<&str>) -> Result<(), ValidationError> {
        let (Some(allowed), Some(content_type)) = (&self.allowed_mime_types, content_type) else {
            return Ok(());
        };

        if allowed.iter().any(|candidate| candidate == content_type) {
            Ok(())
        } else {
            Err(ValidationError::MimeNotAllowed {
                content_type: content_type.to_string(),
                allowed: allowed.clone(),
            })
        }
    }
}

fn validate_filename(filename: &str) -> Result<(), ValidationError> {
    if filename.trim().is_empty() {
        return Err(ValidationError::EmptyFilename);
    }

    if filename
        .chars()
        .any(|c| FORBIDDEN_FILENAME_CHARS.contains(&c) || (c as u32) < 0x20)
    {
        return Err(ValidationError::InvalidFilename);
    }

    let length = filename.chars().count();
    if length > MAX_FILENAME_LENGTH {
        return Err(ValidationError::FilenameTooLong { length });
    }

    Ok(())
}

/// Lowercase trailing extension of `filename`, or an empty string when it has none.
pub fn file_extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, extension)) => extension.to_lowercase(),
        None => String::new(),
    }
}

pub fn infer_mime_type(filename: &str) -> &'static str {
    match file_extension(filename).as_str() {
        // Images
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",

        // Documents
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" => "text/plain",
        "rtf" => "application/rtf",

        // Audio
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",

        // Video
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "webm" => "video/webm",

        // Archives
        "zip" => "application/zip",
        "rar" => "application/x-rar-compressed",
        "7z" => "application/x-7z-compressed",
        "tar" => "application/x-tar",
        "gz" => "application/gzip",

        // Code
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "html" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",

        _ => DEFAULT_MIME_TYPE,
    }
}
