// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Event and batch types shared by the buffer, the writer and the backends.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A single metering event.
///
/// Events are opaque to this crate: they are buffered, batched and
/// serialized as-is, never inspected.
pub type Event = Map<String, Value>;

/// Snapshot of the buffer taken by a single drain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub events: Vec<Event>,
    /// When the buffer went from empty to non-empty. `None` iff `events` is empty.
    pub first_entry_time: Option<DateTime<Utc>>,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
