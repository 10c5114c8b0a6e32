//! Plain-text rendering for terminal output.

use chrono::{DateTime, Utc};
use tabvault_core::DiagnosticsReport;
use tabvault_core::model::{Group, Stats, TimeBucket};
use tabvault_core::status::format_age;

pub fn render_status(report: &DiagnosticsReport) -> String {
    let mut lines = vec![format!(
        "status:  {}",
        if report.is_valid() { "ok" } else { "needs attention" }
    )];
    lines.push(format!("summary: {}", report.summary()));
    if report.index_valid {
        lines.push(format!(
            "groups:  {} ({} invalid)",
            report.total_groups, report.invalid_groups
        ));
        lines.push(format!(
            "chunks:  {} ({} invalid){}",
            report.total_chunks,
            report.invalid_chunks,
            if report.compressed { ", compressed" } else { "" }
        ));
        lines.push(format!("items:   {}", report.total_items));
    }
    lines.push(match &report.backup {
        Some(backup) => format!("backup:  {}", backup.age),
        None => "backup:  none".to_string(),
    });
    if let Some(usage) = &report.usage {
        lines.push(format!(
            "usage:   {} / {} bytes ({}%)",
            usage.used, usage.total, usage.percent
        ));
    }
    lines.join("\n")
}

pub fn render_group(group: &Group, now: DateTime<Utc>) -> String {
    let mut out = format!(
        "{} [{}] ({} items, {})",
        group.name,
        group.id,
        group.items.len(),
        format_age(group.created_at, now)
    );
    for item in &group.items {
        out.push_str(&format!("\n  {} [{}]\n    {}", item.title, item.id, item.url));
    }
    out
}

pub fn render_bucket(bucket: TimeBucket, groups: &[&Group], now: DateTime<Utc>) -> String {
    let mut out = format!("== {} ==", bucket.label());
    for group in groups {
        out.push('\n');
        out.push_str(&render_group(group, now));
    }
    out
}

pub fn render_stats(stats: &Stats) -> String {
    format!(
        "{} groups, {} items, {} saved today",
        stats.total_groups, stats.total_items, stats.saved_today
    )
}
