//! Read-only diagnostics over the stored data.

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;
use serde_json::Value;

use crate::backend::KvBackend;
use crate::error::StorageError;
use crate::json_ext::JsonExt;
use crate::store::{backup_timestamp, loader};
use crate::validate::{is_valid_chunk, is_valid_group};

/// Usage above this share of the quota is worth a warning.
pub const USAGE_WARNING_PERCENT: f64 = 80.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupStatus {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub age: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageUsage {
    pub used: usize,
    pub total: usize,
    /// Rounded to one decimal.
    pub percent: f64,
}

impl StorageUsage {
    fn new(used: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            (used as f64 / total as f64 * 1000.0).round() / 10.0
        };
        Self {
            used,
            total,
            percent,
        }
    }

    pub fn is_high(&self) -> bool {
        self.percent > USAGE_WARNING_PERCENT
    }
}

/// Result of [`StateStore::check_status`](crate::store::StateStore::check_status).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsReport {
    pub index_valid: bool,
    pub compressed: bool,
    pub total_groups: usize,
    pub valid_groups: usize,
    pub invalid_groups: usize,
    pub total_chunks: usize,
    pub valid_chunks: usize,
    pub invalid_chunks: usize,
    /// Sum of chunk ref counts across valid groups.
    pub total_items: usize,
    pub backup: Option<BackupStatus>,
    /// `None` when the backend could not report its usage.
    pub usage: Option<StorageUsage>,
}

impl DiagnosticsReport {
    pub fn is_valid(&self) -> bool {
        self.index_valid && self.invalid_groups == 0 && self.invalid_chunks == 0
    }

    pub fn summary(&self) -> String {
        if !self.index_valid {
            return "index missing or malformed".to_string();
        }
        let mut line = format!(
            "{}/{} groups valid, {}/{} chunks valid, {} items",
            self.valid_groups, self.total_groups, self.valid_chunks, self.total_chunks, self.total_items
        );
        if let Some(usage) = &self.usage {
            line.push_str(&format!(", {}% of quota used", usage.percent));
        }
        line
    }
}

/// Human-readable age of `then` relative to `now`.
pub fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now - then;
    let minutes = age.num_minutes().max(0);
    if minutes < 60 {
        return format!("{} minutes ago", minutes);
    }
    let hours = age.num_hours();
    if hours < 24 {
        return format!("{} hours ago", hours);
    }
    let days = age.num_days();
    if days < 30 {
        return format!("{} days ago", days);
    }
    then.format("%Y-%m-%d").to_string()
}

pub(crate) async fn audit(backend: &dyn KvBackend) -> Result<DiagnosticsReport, StorageError> {
    let mut report = DiagnosticsReport {
        index_valid: false,
        compressed: false,
        total_groups: 0,
        valid_groups: 0,
        invalid_groups: 0,
        total_chunks: 0,
        valid_chunks: 0,
        invalid_chunks: 0,
        total_items: 0,
        backup: None,
        usage: None,
    };

    if let loader::IndexRead::Valid { index, compressed } = loader::read_index(backend).await? {
        report.index_valid = true;
        report.compressed = compressed;
        let groups = index.get_array("groups").map(Vec::as_slice).unwrap_or_default();
        report.total_groups = groups.len();
        for group in groups {
            if is_valid_group(group) {
                report.valid_groups += 1;
                let items: u64 = group
                    .get_array("tabs")
                    .map(Vec::as_slice)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|r| r.get_u64("count"))
                    .fold(0, u64::saturating_add);
                report.total_items = report
                    .total_items
                    .saturating_add(usize::try_from(items).unwrap_or(usize::MAX));
            } else {
                report.invalid_groups += 1;
            }
        }

        // same bound as a load
        let (count, _) = loader::chunk_count(backend).await?;
        report.total_chunks = count;
        for i in 0..report.total_chunks {
            let valid = loader::read_chunk(backend, i, compressed)
                .await
                .is_ok_and(|items| is_valid_chunk(&Value::Array(items)));
            if valid {
                report.valid_chunks += 1;
            } else {
                report.invalid_chunks += 1;
            }
        }
    }

    let now = Utc::now();
    report.backup = backup_timestamp(backend).await?.map(|timestamp| BackupStatus {
        timestamp,
        age: DateTime::from_timestamp_millis(timestamp)
            .map(|then| format_age(then, now))
            .unwrap_or_else(|| "unknown".to_string()),
    });

    report.usage = match backend.bytes_in_use().await {
        Ok(used) => Some(StorageUsage::new(used, backend.limits().total_quota_bytes)),
        Err(e) => {
            warn!("could not read storage usage: {}", e);
            None
        }
    };
    if let Some(usage) = &report.usage
        && usage.is_high()
    {
        warn!(
            "storage is {}% full; export your data to free space",
            usage.percent
        );
    }

    Ok(report)
}
