// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded in-memory buffer of events waiting to be flushed.
//!
//! The buffer never blocks producers and never grows past its capacity: a
//! batch that does not fit is dropped as a whole, nothing from it is
//! admitted. Draining takes everything at once and resets the buffer.

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::warn;

use crate::errors::CapacityExceeded;
use crate::event::{Batch, Event};

/// Default maximum number of buffered events.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 10_000;

#[derive(Debug, Default)]
struct BufferState {
    events: Vec<Event>,
    first_entry_time: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct EventsBuffer {
    state: Mutex<BufferState>,
    max_buffer_size: usize,
}

impl Default for EventsBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_SIZE)
    }
}

impl EventsBuffer {
    #[must_use]
    pub fn new(max_buffer_size: usize) -> Self {
        EventsBuffer {
            state: Mutex::new(BufferState::default()),
            max_buffer_size,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.max_buffer_size
    }

    /// Appends `events`, or rejects all of them if they would overflow the buffer.
    ///
    /// Returns the buffer size after the call, so the caller can decide whether
    /// a flush is due.
    pub async fn try_add(&self, events: Vec<Event>) -> Result<usize, CapacityExceeded> {
        let mut state = self.state.lock().await;

        if state.events.len() + events.len() > self.max_buffer_size {
            return Err(CapacityExceeded {
                dropped: events.len(),
                capacity: self.max_buffer_size,
                size: state.events.len(),
            });
        }

        if events.is_empty() {
            return Ok(state.events.len());
        }

        if state.first_entry_time.is_none() {
            state.first_entry_time = Some(Utc::now());
        }

        state.events.extend(events);
        Ok(state.events.len())
    }

    /// Same as [`EventsBuffer::try_add`], logging and swallowing a rejection.
    ///
    /// Returns the (possibly unchanged) buffer size.
    pub async fn add(&self, events: Vec<Event>) -> usize {
        match self.try_add(events).await {
            Ok(size) => size,
            Err(e) => {
                warn!("BUFFER | {e}");
                e.size
            }
        }
    }

    /// Takes every buffered event and resets the buffer.
    pub async fn extract_all(&self) -> Batch {
        let mut state = self.state.lock().await;
        Batch {
            events: std::mem::take(&mut state.events),
            first_entry_time: state.first_entry_time.take(),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.events.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.events.is_empty()
    }
}
