// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use meter_events::{
    config::{ForwarderConfig, LogConfig},
    event::Event,
    factory::build_writer,
    logger::Formatter,
    writer::EventsWriter,
};

const SHUTDOWN_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
enum LineError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected an event object or an array of event objects")]
    NotAnEvent,
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = match ForwarderConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("METER_EVENTS | ERROR | Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.log) {
        eprintln!("METER_EVENTS | ERROR | Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }
    debug!("Logging subsystem enabled");

    let writer = match build_writer(&config) {
        Ok(writer) => writer,
        Err(e) => {
            error!("FORWARDER | Error creating events writer: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "FORWARDER | Forwarding events from stdin: flush_interval: {:?}, batch_size: {}",
        config.flush_interval, config.batch_size
    );

    forward_stdin(&writer).await;

    writer.shutdown().await;
    if writer.wait_for_uploads(SHUTDOWN_UPLOAD_TIMEOUT).await {
        info!("FORWARDER | All uploads completed, exiting");
    }
    ExitCode::SUCCESS
}

fn init_logging(log: &LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_new(format!(
        "h2=off,hyper=off,rustls=off,reqwest=off,{}",
        log.level
    ))?;

    let builder = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(false)
        .with_writer(std::io::stderr);

    if log.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(
            builder.event_format(Formatter).finish(),
        )?;
    }
    Ok(())
}

async fn forward_stdin(writer: &EventsWriter) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_line(&line) {
                        Ok(events) => writer.submit(events).await,
                        Err(e) => warn!("FORWARDER | Skipping input line: {e}"),
                    }
                }
                Ok(None) => {
                    debug!("FORWARDER | End of input reached");
                    break;
                }
                Err(e) => {
                    error!("FORWARDER | Failed to read stdin: {e}");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("FORWARDER | Interrupted, shutting down");
                break;
            }
        }
    }
}

/// A line holds one event object or an array of event objects.
fn parse_line(line: &str) -> Result<Vec<Event>, LineError> {
    match serde_json::from_str::<serde_json::Value>(line)? {
        serde_json::Value::Object(event) => Ok(vec![event]),
        serde_json::Value::Array(values) => values
            .into_iter()
            .map(|value| match value {
                serde_json::Value::Object(event) => Ok(event),
                _ => Err(LineError::NotAnEvent),
            })
            .collect(),
        _ => Err(LineError::NotAnEvent),
    }
}
