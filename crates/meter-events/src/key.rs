// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};

/// Builds the storage key of a batch.
///
/// Keys are partitioned by minute and end with a random 8 hex digit suffix,
/// so that batches flushed within the same minute never overwrite each other:
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use meter_events::key::make_key;
///
/// let ts = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 42).unwrap();
/// let key = make_key(ts, Some("usage"));
/// assert!(key.starts_with("usage/2024/03/09/07/05/merged_logs_"));
/// assert!(key.ends_with(".json.gz"));
/// ```
#[must_use]
pub fn make_key(timestamp: DateTime<Utc>, path: Option<&str>) -> String {
    let base_path = match path {
        Some(path) if !path.is_empty() => format!("{path}/"),
        _ => String::new(),
    };
    let date_part = timestamp.format("%Y/%m/%d/%H/%M");
    let suffix = fastrand::u32(..);

    format!("{base_path}{date_part}/merged_logs_{suffix:08x}.json.gz")
}
