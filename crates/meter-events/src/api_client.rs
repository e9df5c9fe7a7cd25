// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Storage backend posting batches to the metering ingestion API.
//!
//! Each batch is sent as a gzip compressed JSON array. Server errors (5xx)
//! and transport failures are retried following the client's
//! [`RetryStrategy`]; any other non-success status is a validation error and
//! is returned after the first attempt.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core::time::Duration;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use tracing::debug;

use crate::backend::StorageBackend;
use crate::errors::UploadError;
use crate::key::make_key;
use crate::payload;
use crate::retry::{send_with_retry, RetryStrategy};

pub const DEFAULT_API_ENDPOINT: &str = "https://ingest.amberflo.io";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const API_KEY_HEADER: &str = "x-api-key";

/// Builds the HTTP client used by [`ApiClient`], routed through `https_proxy` when set.
pub fn build_client(
    https_proxy: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)));
    if let Some(proxy) = https_proxy {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    builder.build()
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    retry_strategy: RetryStrategy,
}

impl ApiClient {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        endpoint: String,
        api_key: String,
        retry_strategy: RetryStrategy,
    ) -> Self {
        debug!("API | Initialized API client: endpoint: {endpoint}");
        ApiClient {
            client,
            endpoint,
            api_key,
            retry_strategy,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, key: &str, body: Bytes) -> Result<(), UploadError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .header(CONTENT_TYPE, payload::CONTENT_TYPE)
            .header(CONTENT_ENCODING, payload::CONTENT_ENCODING)
            .body(body)
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    debug!("API | Wrote to API: {key}: {status}");
                    return Ok(());
                }
                let message = response.text().await.unwrap_or_default();
                Err(UploadError::from_status(key, status, message))
            }
            Err(e) => Err(UploadError::Transient {
                key: key.to_string(),
                status: e.status(),
                message: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl StorageBackend for ApiClient {
    async fn upload(&self, key: &str, body: Bytes) -> Result<(), UploadError> {
        debug!("API | Attempting write to API: {key}");

        send_with_retry(&self.retry_strategy, UploadError::is_retryable, move || {
            self.send(key, body.clone())
        })
        .await
    }

    fn make_key(&self, timestamp: DateTime<Utc>) -> String {
        make_key(timestamp, None)
    }
}
