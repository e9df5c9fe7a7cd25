// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use crate::api_client::{build_client, ApiClient};
use crate::backend::StorageBackend;
use crate::buffer::EventsBuffer;
use crate::config::{BackendConfig, ForwarderConfig};
use crate::errors::ConfigError;
use crate::local_dir::LocalDirBackend;
use crate::retry::RetryStrategy;
use crate::writer::EventsWriter;

pub fn build_backend(config: &BackendConfig) -> Result<Arc<dyn StorageBackend>, ConfigError> {
    match config {
        BackendConfig::Api {
            endpoint,
            api_key,
            https_proxy,
            timeout,
        } => {
            let client = build_client(https_proxy.as_deref(), *timeout)
                .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
            Ok(Arc::new(ApiClient::new(
                client,
                endpoint.clone(),
                api_key.clone(),
                RetryStrategy::default(),
            )))
        }
        BackendConfig::LocalDir { root, path } => {
            Ok(Arc::new(LocalDirBackend::new(root.clone(), path.clone())))
        }
    }
}

/// Builds a writer around the backend selected by `config`.
///
/// Nothing is spawned here; the periodic flush task starts on the first submit.
pub fn build_writer(config: &ForwarderConfig) -> Result<EventsWriter, ConfigError> {
    let backend = build_backend(&config.backend)?;
    EventsWriter::new(
        backend,
        EventsBuffer::new(config.max_buffer_size),
        config.writer_config(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::LogConfig;
    use serde_json::json;
    use std::time::Duration;

    fn file_config(root: &std::path::Path) -> ForwarderConfig {
        ForwarderConfig {
            flush_interval: Duration::from_secs(60),
            batch_size: 2,
            max_buffer_size: 10,
            backend: BackendConfig::LocalDir {
                root: root.to_path_buf(),
                path: Some("usage".to_string()),
            },
            log: LogConfig::default(),
        }
    }

    #[test]
    fn test_invalid_proxy_is_a_config_error() {
        let result = build_backend(&BackendConfig::Api {
            endpoint: "https://ingest.amberflo.io".to_string(),
            api_key: "secret".to_string(),
            https_proxy: Some("not a url".to_string()),
            timeout: Duration::from_secs(30),
        });
        assert!(matches!(result, Err(ConfigError::HttpClient(_))));
    }

    #[tokio::test]
    async fn test_file_writer_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let writer = build_writer(&file_config(dir.path())).unwrap();

        let event = json!({"meterApiName": "llm_api_call", "meterValue": 1})
            .as_object()
            .unwrap()
            .clone();
        writer.submit(vec![event.clone(), event]).await;
        assert!(writer.wait_for_uploads(Duration::from_secs(5)).await);
        writer.shutdown().await;

        let usage = dir.path().join("usage");
        let mut files = Vec::new();
        let mut pending = vec![usage];
        while let Some(path) = pending.pop() {
            for entry in std::fs::read_dir(path).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        assert_eq!(files.len(), 1);
        assert!(files[0].to_string_lossy().ends_with(".json.gz"));
    }
}
