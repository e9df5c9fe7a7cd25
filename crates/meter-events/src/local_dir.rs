// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Storage backend writing each batch to a file under a root directory.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::backend::StorageBackend;
use crate::errors::UploadError;
use crate::key::make_key;

#[derive(Debug, Clone)]
pub struct LocalDirBackend {
    root: PathBuf,
    path: Option<String>,
}

impl LocalDirBackend {
    /// `path` is prepended to every key, below `root`.
    #[must_use]
    pub fn new(root: PathBuf, path: Option<String>) -> Self {
        debug!("LOCAL_DIR | Writing batches under {}", root.display());
        LocalDirBackend { root, path }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn write_file(target: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(target, body)
}

fn upload_error(key: &str, e: &std::io::Error) -> UploadError {
    let key = key.to_string();
    let message = e.to_string();
    match e.kind() {
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            UploadError::Transient {
                key,
                status: None,
                message,
            }
        }
        _ => UploadError::Fatal {
            key,
            status: None,
            message,
        },
    }
}

#[async_trait]
impl StorageBackend for LocalDirBackend {
    async fn upload(&self, key: &str, body: Bytes) -> Result<(), UploadError> {
        let target = self.root.join(key);
        debug!("LOCAL_DIR | Writing {} bytes to {}", body.len(), target.display());

        let result = tokio::task::spawn_blocking(move || write_file(&target, &body))
            .await
            .map_err(|e| UploadError::Fatal {
                key: key.to_string(),
                status: None,
                message: format!("write task failed: {e}"),
            })?;

        result.map_err(|e| upload_error(key, &e))
    }

    fn make_key(&self, timestamp: DateTime<Utc>) -> String {
        make_key(timestamp, self.path.as_deref())
    }
}
