// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory storage backends

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use meter_events::backend::StorageBackend;
use meter_events::errors::UploadError;
use meter_events::event::Event;
use meter_events::key::make_key;
use serde_json::json;
use std::io::Read;
use std::sync::Mutex;

/// A decoded upload: the key and the events of the batch
#[derive(Debug, Clone)]
pub struct Upload {
    pub key: String,
    pub events: Vec<Event>,
}

/// Records every upload, decoding the gzip payload back to events
#[derive(Default)]
pub struct RecordingBackend {
    uploads: Mutex<Vec<Upload>>,
    keys_from: Mutex<Vec<DateTime<Utc>>>,
}

#[allow(dead_code)]
impl RecordingBackend {
    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    /// Timestamps `make_key` was called with
    pub fn key_timestamps(&self) -> Vec<DateTime<Utc>> {
        self.keys_from.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageBackend for RecordingBackend {
    async fn upload(&self, key: &str, body: Bytes) -> Result<(), UploadError> {
        let mut decoder = GzDecoder::new(&body[..]);
        let mut json_bytes = Vec::new();
        decoder.read_to_end(&mut json_bytes).unwrap();
        let events: Vec<Event> = serde_json::from_slice(&json_bytes).unwrap();

        self.uploads.lock().unwrap().push(Upload {
            key: key.to_string(),
            events,
        });
        Ok(())
    }

    fn make_key(&self, timestamp: DateTime<Utc>) -> String {
        self.keys_from.lock().unwrap().push(timestamp);
        make_key(timestamp, Some("test"))
    }
}

#[allow(dead_code)]
pub fn event(id: u64) -> Event {
    json!({
        "customerId": "customer-1",
        "meterApiName": "llm_api_call",
        "meterValue": 1,
        "uniqueId": id,
    })
    .as_object()
    .unwrap()
    .clone()
}

#[allow(dead_code)]
pub fn ids(events: &[Event]) -> Vec<u64> {
    events
        .iter()
        .map(|event| event["uniqueId"].as_u64().unwrap())
        .collect()
}
