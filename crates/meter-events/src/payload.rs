// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Upload payload encoding: a JSON array of events, gzip compressed.

use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use std::io::Write;
use tracing::debug;

use crate::errors::FlushError;
use crate::event::Event;

pub const CONTENT_TYPE: &str = "application/json";
pub const CONTENT_ENCODING: &str = "gzip";

pub fn prepare_body(events: &[Event]) -> Result<Bytes, FlushError> {
    let json_bytes = serde_json::to_vec(events)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json_bytes)?;
    let compressed = encoder.finish()?;

    #[allow(clippy::cast_precision_loss)]
    let ratio = compressed.len() as f64 / json_bytes.len().max(1) as f64;
    debug!(
        "PAYLOAD | Events file size: {} (compression ratio: {ratio:.2})",
        compressed.len()
    );

    Ok(Bytes::from(compressed))
}
