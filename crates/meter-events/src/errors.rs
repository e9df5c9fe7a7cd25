// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// An incoming batch did not fit in the buffer and was dropped as a whole.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dropping {dropped} events: buffer full (capacity: {capacity}, size: {size})")]
pub struct CapacityExceeded {
    pub dropped: usize,
    pub capacity: usize,
    pub size: usize,
}

/// Failure of a single upload attempt.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Server side or transport failure, worth another attempt.
    #[error("upload failed for key {key} ({status:?}): {message}")]
    Transient {
        key: String,
        status: Option<StatusCode>,
        message: String,
    },
    /// Client side failure; retrying will not help.
    #[error("upload rejected for key {key} ({status:?}): {message}")]
    Fatal {
        key: String,
        status: Option<StatusCode>,
        message: String,
    },
}

impl UploadError {
    /// Classifies a non-success HTTP status: `>= 500` is transient, anything else fatal.
    #[must_use]
    pub fn from_status(key: &str, status: StatusCode, message: String) -> Self {
        if status.is_server_error() {
            UploadError::Transient {
                key: key.to_string(),
                status: Some(status),
                message,
            }
        } else {
            UploadError::Fatal {
                key: key.to_string(),
                status: Some(status),
                message,
            }
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::Transient { .. })
    }

    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            UploadError::Transient { status, .. } | UploadError::Fatal { status, .. } => *status,
        }
    }
}

/// Failure to turn a drained batch into an upload payload.
#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    #[error("failed to serialize events: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to compress events: {0}")]
    Compress(#[from] std::io::Error),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} must be a positive integer, got: {value}")]
    NotPositiveInt { key: &'static str, value: String },
    #[error("Invalid log level '{0}'. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
    #[error("Unsupported AFLO_BACKEND_TYPE: {0}")]
    UnsupportedBackend(String),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}
