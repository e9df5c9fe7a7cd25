// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::errors::UploadError;

/// Destination of flushed batches.
///
/// Implementations own their transport, authentication and retries. A
/// backend wrapping a blocking client must run it on the blocking pool
/// (`tokio::task::spawn_blocking`) so that uploads never stall the runtime.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Stores `body` (a gzip compressed JSON array of events) under `key`.
    async fn upload(&self, key: &str, body: Bytes) -> Result<(), UploadError>;

    /// Derives the storage key of a batch from its first entry time.
    fn make_key(&self, timestamp: DateTime<Utc>) -> String;
}
