// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::api_client::{DEFAULT_API_ENDPOINT, DEFAULT_REQUEST_TIMEOUT};
use crate::buffer::DEFAULT_MAX_BUFFER_SIZE;
use crate::errors::ConfigError;
use crate::writer::{EventsWriterConfig, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL};

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Where flushed batches go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Metering ingestion API
    Api {
        endpoint: String,
        api_key: String,
        https_proxy: Option<String>,
        timeout: Duration,
    },
    /// Files under a local directory
    LocalDir { root: PathBuf, path: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// One of trace, debug, info, warn, error
    pub level: String,
    /// Emit JSON lines instead of the prefixed text format
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            json: true,
        }
    }
}

/// Configuration of the events forwarder, read from `AFLO_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderConfig {
    pub flush_interval: Duration,
    pub batch_size: usize,
    pub max_buffer_size: usize,
    pub backend: BackendConfig,
    pub log: LogConfig,
}

impl ForwarderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let flush_interval = positive_int("AFLO_FLUSH_INTERVAL")?
            .map_or(DEFAULT_FLUSH_INTERVAL, Duration::from_secs);
        let batch_size = positive_usize("AFLO_BATCH_SIZE")?.unwrap_or(DEFAULT_BATCH_SIZE);
        let max_buffer_size =
            positive_usize("AFLO_MAX_BUFFER_SIZE")?.unwrap_or(DEFAULT_MAX_BUFFER_SIZE);

        let backend_type = non_empty("AFLO_BACKEND_TYPE")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|| "api".to_string());
        let backend = match backend_type.as_str() {
            "api" => BackendConfig::Api {
                endpoint: non_empty("AFLO_API_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
                api_key: non_empty("AFLO_API_KEY").ok_or(ConfigError::Missing("AFLO_API_KEY"))?,
                https_proxy: non_empty("AFLO_HTTPS_PROXY").or_else(|| non_empty("HTTPS_PROXY")),
                timeout: positive_int("AFLO_REQUEST_TIMEOUT")?
                    .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs),
            },
            "file" => BackendConfig::LocalDir {
                root: non_empty("AFLO_OUTPUT_DIR")
                    .map(PathBuf::from)
                    .ok_or(ConfigError::Missing("AFLO_OUTPUT_DIR"))?,
                path: non_empty("AFLO_PATH"),
            },
            _ => return Err(ConfigError::UnsupportedBackend(backend_type)),
        };

        let level = if boolean("AFLO_DEBUG").unwrap_or(false) {
            "debug".to_string()
        } else {
            non_empty("AFLO_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or_else(|| "info".to_string())
        };
        let log = LogConfig {
            level,
            json: boolean("AFLO_JSON_LOGS").unwrap_or(true),
        };

        let config = ForwarderConfig {
            flush_interval,
            batch_size,
            max_buffer_size,
            backend,
            log,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.log.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.log.level.clone()));
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::NotPositiveInt {
                key: "AFLO_FLUSH_INTERVAL",
                value: "0".to_string(),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::NotPositiveInt {
                key: "AFLO_BATCH_SIZE",
                value: "0".to_string(),
            });
        }
        if self.max_buffer_size == 0 {
            return Err(ConfigError::NotPositiveInt {
                key: "AFLO_MAX_BUFFER_SIZE",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn writer_config(&self) -> EventsWriterConfig {
        EventsWriterConfig {
            flush_interval: self.flush_interval,
            batch_size: self.batch_size,
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

fn positive_int(key: &'static str) -> Result<Option<u64>, ConfigError> {
    let Some(value) = non_empty(key) else {
        return Ok(None);
    };
    match value.parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(Some(parsed)),
        _ => Err(ConfigError::NotPositiveInt { key, value }),
    }
}

fn positive_usize(key: &'static str) -> Result<Option<usize>, ConfigError> {
    let Some(value) = positive_int(key)? else {
        return Ok(None);
    };
    usize::try_from(value)
        .map(Some)
        .map_err(|_| ConfigError::NotPositiveInt {
            key,
            value: value.to_string(),
        })
}

fn boolean(key: &str) -> Option<bool> {
    non_empty(key).map(|val| matches!(val.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
}
