// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffered, non-blocking writer of metering events.
//!
//! # Architecture
//!
//! ```text
//!   producer
//!       │ submit(events)
//!       v
//!   ┌─────────────┐
//!   │   Buffer    │ (bounded, drops whole batches when full)
//!   └──────┬──────┘
//!          │ size threshold reached / periodic timer
//!          v
//!   ┌─────────────┐
//!   │    Flush    │ (drain + JSON + gzip, serialized by the flush lock)
//!   └──────┬──────┘
//!          │ spawned, not awaited
//!          v
//!   ┌─────────────┐
//!   │   Upload    │ (storage backend, retries are backend-owned)
//!   └─────────────┘
//! ```
//!
//! Producers never wait for uploads and never see an error: every failure
//! past [`EventsWriter::submit`] is logged and dropped. A batch that has been
//! drained but not yet uploaded is lost if the process dies.

use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn, Instrument};

use crate::backend::StorageBackend;
use crate::buffer::EventsBuffer;
use crate::errors::{ConfigError, FlushError};
use crate::event::Event;
use crate::payload::prepare_body;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_BATCH_SIZE: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventsWriterConfig {
    /// Time between two periodic flushes.
    pub flush_interval: Duration,
    /// Buffer size at which `submit` flushes right away.
    pub batch_size: usize,
}

impl Default for EventsWriterConfig {
    fn default() -> Self {
        EventsWriterConfig {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug)]
enum FlushTask {
    Idle,
    Running(JoinHandle<()>),
    Stopped,
}

/// Cheap to clone; clones share the same buffer, flush task and uploads.
#[derive(Clone)]
pub struct EventsWriter {
    backend: Arc<dyn StorageBackend>,
    buffer: Arc<EventsBuffer>,
    flush_interval: Duration,
    batch_size: usize,
    // Serializes size triggered and timer triggered flushes.
    flush_lock: Arc<tokio::sync::Mutex<()>>,
    flush_task: Arc<Mutex<FlushTask>>,
    cancel_token: CancellationToken,
    uploads: TaskTracker,
}

impl EventsWriter {
    /// Fails if the flush interval or the batch size is zero.
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        buffer: EventsBuffer,
        config: EventsWriterConfig,
    ) -> Result<Self, ConfigError> {
        if config.flush_interval.is_zero() {
            return Err(ConfigError::Zero("flush_interval"));
        }
        if config.batch_size == 0 {
            return Err(ConfigError::Zero("batch_size"));
        }
        if config.batch_size > buffer.capacity() {
            warn!(
                "WRITER | Batch size {} exceeds buffer capacity {}, only periodic flushes will run",
                config.batch_size,
                buffer.capacity()
            );
        }
        debug!(
            "WRITER | Events writer initialized: flush_interval: {:?}, batch_size: {}",
            config.flush_interval, config.batch_size
        );

        Ok(EventsWriter {
            backend,
            buffer: Arc::new(buffer),
            flush_interval: config.flush_interval,
            batch_size: config.batch_size,
            flush_lock: Arc::new(tokio::sync::Mutex::new(())),
            flush_task: Arc::new(Mutex::new(FlushTask::Idle)),
            cancel_token: CancellationToken::new(),
            uploads: TaskTracker::new(),
        })
    }

    /// Buffers `events` for asynchronous upload.
    ///
    /// The first call starts the periodic flush task on the current runtime.
    /// Flushes right away once the buffer holds `batch_size` events. Never
    /// waits for an upload and never fails: rejected events and flush errors
    /// are logged.
    pub async fn submit(&self, events: Vec<Event>) {
        self.ensure_flush_task();

        debug!("WRITER | Received {} events to write", events.len());

        let buffer_size = self.buffer.add(events).await;
        if buffer_size >= self.batch_size {
            debug!(
                "WRITER | Buffer reached batch size ({buffer_size} >= {}), flushing",
                self.batch_size
            );
            self.flush_logged("Size triggered").await;
        }
    }

    /// Drains the buffer and schedules the upload of its content.
    ///
    /// Returns the number of events handed to the backend. The upload runs in
    /// a detached task: this returns as soon as it is spawned, and upload
    /// failures only show up in the logs.
    pub async fn flush(&self) -> Result<usize, FlushError> {
        let _flush_guard = self.flush_lock.lock().await;

        let batch = self.buffer.extract_all().await;
        if batch.is_empty() {
            debug!("WRITER | No events to flush");
            return Ok(0);
        }

        let count = batch.len();
        let key = self
            .backend
            .make_key(batch.first_entry_time.unwrap_or_else(Utc::now));

        info!("WRITER | Flushing {count} events to: {key}");

        let body = prepare_body(&batch.events)?;

        let backend = Arc::clone(&self.backend);
        let upload = async move {
            match AssertUnwindSafe(backend.upload(&key, body))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => debug!("WRITER | Uploaded {count} events to: {key}"),
                Ok(Err(e)) => error!("WRITER | Failed to upload {count} events: {e}"),
                Err(_) => error!("WRITER | Upload of {count} events to {key} panicked"),
            }
        };
        self.uploads.spawn(upload.in_current_span());

        Ok(count)
    }

    /// Stops the periodic flush task after one last flush.
    ///
    /// Waits for that flush to drain the buffer, not for its upload; see
    /// [`EventsWriter::wait_for_uploads`]. Calling it again is a no-op. Events
    /// submitted afterwards are still buffered and flushed on the size
    /// threshold, but no timer is restarted.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();

        let task = {
            let mut task = self
                .flush_task
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *task, FlushTask::Stopped)
        };

        match task {
            FlushTask::Running(handle) => {
                if let Err(e) = handle.await {
                    error!("WRITER | Periodic flush task ended abnormally: {e}");
                }
            }
            FlushTask::Idle => self.flush_logged("Final").await,
            FlushTask::Stopped => {}
        }
    }

    /// Waits up to `timeout` for every upload spawned so far.
    ///
    /// Returns `false` if some uploads were still running at the deadline.
    pub async fn wait_for_uploads(&self, timeout: Duration) -> bool {
        self.uploads.close();
        let done = tokio::time::timeout(timeout, self.uploads.wait())
            .await
            .is_ok();
        self.uploads.reopen();

        if !done {
            warn!(
                "WRITER | {} uploads still running after {timeout:?}",
                self.uploads.len()
            );
        }
        done
    }

    /// Number of events currently waiting in the buffer.
    pub async fn buffered(&self) -> usize {
        self.buffer.len().await
    }

    fn ensure_flush_task(&self) {
        let mut task = self
            .flush_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if matches!(*task, FlushTask::Idle) {
            let writer = self.clone();
            *task = FlushTask::Running(tokio::spawn(
                writer.run_periodic_flush().in_current_span(),
            ));
            debug!("WRITER | Periodic flush task started");
        }
    }

    async fn run_periodic_flush(self) {
        loop {
            tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => {
                    debug!("WRITER | Periodic flush task cancelled, flushing");
                    self.flush_logged("Final").await;
                    break;
                }
                () = tokio::time::sleep(self.flush_interval) => {
                    debug!("WRITER | Periodic flush timer triggered, flushing");
                    self.flush_logged("Periodic").await;
                }
            }
        }
        debug!("WRITER | Periodic flush task stopped");
    }

    // Flush errors and panics must not escape to producers or end the periodic task.
    async fn flush_logged(&self, trigger: &str) {
        match AssertUnwindSafe(self.flush()).catch_unwind().await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("WRITER | {trigger} flush failed: {e}"),
            Err(_) => error!("WRITER | {trigger} flush panicked"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::errors::UploadError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::DateTime;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tracing_test::traced_test;

    #[derive(Default)]
    struct FlakyBackend {
        panic_next_key: AtomicBool,
        panic_next_upload: AtomicBool,
        uploads: AtomicUsize,
    }

    #[async_trait]
    impl StorageBackend for FlakyBackend {
        async fn upload(&self, key: &str, _body: Bytes) -> Result<(), UploadError> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            if self.panic_next_upload.swap(false, Ordering::SeqCst) {
                panic!("storage client crashed");
            }
            Err(UploadError::Fatal {
                key: key.to_string(),
                status: None,
                message: "access denied".to_string(),
            })
        }

        fn make_key(&self, timestamp: DateTime<Utc>) -> String {
            if self.panic_next_key.swap(false, Ordering::SeqCst) {
                panic!("key generation failed");
            }
            crate::key::make_key(timestamp, None)
        }
    }

    fn event(id: u64) -> Event {
        json!({ "uniqueId": id }).as_object().unwrap().clone()
    }

    fn writer(backend: Arc<FlakyBackend>, flush_interval: Duration, batch_size: usize) -> EventsWriter {
        EventsWriter::new(
            backend,
            EventsBuffer::default(),
            EventsWriterConfig {
                flush_interval,
                batch_size,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn test_upload_failure_is_logged_not_raised() {
        let backend = Arc::new(FlakyBackend::default());
        let writer = writer(Arc::clone(&backend), DEFAULT_FLUSH_INTERVAL, 1);

        writer.submit(vec![event(1)]).await;
        assert!(writer.wait_for_uploads(Duration::from_secs(1)).await);

        assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);
        assert!(logs_contain("Failed to upload 1 events"));
        assert!(logs_contain("access denied"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_periodic_task_survives_panicking_flush() {
        let backend = Arc::new(FlakyBackend::default());
        backend.panic_next_key.store(true, Ordering::SeqCst);
        let writer = writer(Arc::clone(&backend), Duration::from_millis(50), 100);

        writer.submit(vec![event(1)]).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(logs_contain("Periodic flush panicked"));

        writer.submit(vec![event(2)]).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(writer.wait_for_uploads(Duration::from_secs(1)).await);
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);

        writer.shutdown().await;
        assert!(logs_contain("Periodic flush task stopped"));
    }

    #[tokio::test]
    async fn test_size_triggered_panic_does_not_reach_producer() {
        let backend = Arc::new(FlakyBackend::default());
        backend.panic_next_key.store(true, Ordering::SeqCst);
        let writer = writer(Arc::clone(&backend), DEFAULT_FLUSH_INTERVAL, 1);

        writer.submit(vec![event(1)]).await;
        writer.submit(vec![event(2)]).await;
        assert!(writer.wait_for_uploads(Duration::from_secs(1)).await);

        assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(writer.buffered().await, 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_panicking_upload_is_logged() {
        let backend = Arc::new(FlakyBackend::default());
        backend.panic_next_upload.store(true, Ordering::SeqCst);
        let writer = writer(Arc::clone(&backend), DEFAULT_FLUSH_INTERVAL, 2);

        writer.submit(vec![event(1), event(2)]).await;
        assert!(writer.wait_for_uploads(Duration::from_secs(1)).await);

        assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);
        assert!(logs_contain("Upload of 2 events to"));
        assert!(logs_contain("panicked"));

        writer.submit(vec![event(3), event(4)]).await;
        assert!(writer.wait_for_uploads(Duration::from_secs(1)).await);
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 2);
        assert!(logs_contain("Failed to upload 2 events"));
    }

    #[test]
    fn test_zero_interval_or_batch_size_is_rejected() {
        let backend: Arc<dyn StorageBackend> = Arc::new(FlakyBackend::default());

        let result = EventsWriter::new(
            Arc::clone(&backend),
            EventsBuffer::default(),
            EventsWriterConfig {
                flush_interval: Duration::ZERO,
                batch_size: 10,
            },
        );
        assert!(matches!(result, Err(ConfigError::Zero("flush_interval"))));

        let result = EventsWriter::new(
            backend,
            EventsBuffer::default(),
            EventsWriterConfig {
                flush_interval: DEFAULT_FLUSH_INTERVAL,
                batch_size: 0,
            },
        );
        assert!(matches!(result, Err(ConfigError::Zero("batch_size"))));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let backend = Arc::new(FlakyBackend::default());
        let writer = writer(Arc::clone(&backend), DEFAULT_FLUSH_INTERVAL, 100);

        writer.submit(vec![event(1)]).await;
        writer.shutdown().await;
        writer.shutdown().await;
        assert!(writer.wait_for_uploads(Duration::from_secs(1)).await);

        assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);
        assert!(matches!(
            *writer.flush_task.lock().unwrap(),
            FlushTask::Stopped
        ));
    }
}
