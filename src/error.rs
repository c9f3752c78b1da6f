//! Error handling and custom error types
//!
//! Provides unified error handling across the crate using thiserror.

use crate::validation::ValidationError;
use std::fmt;
use thiserror::Error;

/// The storage operation an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upload,
    Delete,
    DownloadUrl,
}

impl Operation {
    /// Capitalized label used at the start of wrapped error messages.
    pub fn title(self) -> &'static str {
        match self {
            Operation::Upload => "Upload",
            Operation::Delete => "Delete",
            Operation::DownloadUrl => "Download URL generation",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operation::Upload => "upload",
            Operation::Delete => "delete",
            Operation::DownloadUrl => "download URL generation",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{operation} operation not supported by {backend}")]
    Unsupported {
        backend: String,
        operation: Operation,
    },

    #[error("{backend} {operation} failed: {message}")]
    Provider {
        backend: String,
        operation: Operation,
        message: String,
    },

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("{} failed: {}", .operation.title(), .source)]
    Storage {
        operation: Operation,
        #[source]
        source: Box<Error>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn provider(
        backend: impl Into<String>,
        operation: Operation,
        message: impl Into<String>,
    ) -> Self {
        Error::Provider {
            backend: backend.into(),
            operation,
            message: message.into(),
        }
    }

    /// Wraps `self` as the outer failure of `operation`.
    pub fn during(self, operation: Operation) -> Self {
        Error::Storage {
            operation,
            source: Box::new(self),
        }
    }

    /// The innermost error beneath any operation wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Storage { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
