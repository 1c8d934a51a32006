//! Placeholder substitution for notification messages

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

const DEVICE_NAME: &str = "{{deviceName}}";
const DURATION: &str = "{{duration}}";
const TIMESTAMP: &str = "{{timestamp}}";

/// Which configured template a notification uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateId {
    Alert,
    Recovery,
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateId::Alert => write!(f, "alert"),
            TemplateId::Recovery => write!(f, "recovery"),
        }
    }
}

/// Values substituted into a template
#[derive(Debug, Clone, PartialEq)]
pub struct MessageContext {
    pub target_name: String,
    pub duration_minutes: i64,
    pub timestamp: DateTime<Utc>,
}

/// Convert a configured minute offset into a fixed timezone, falling back to UTC
pub fn timestamp_offset(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| {
        tracing::warn!("Ignoring out-of-range timestamp offset of {} minutes", minutes);
        Utc.fix()
    })
}

/// Render a timestamp in the fixed offset, e.g. `6/1/2024, 5:30:00 PM UTC+05:30`
pub fn format_timestamp(timestamp: DateTime<Utc>, offset: FixedOffset) -> String {
    let local = timestamp.with_timezone(&offset);
    let label = if offset.local_minus_utc() == 0 {
        "UTC".to_string()
    } else {
        format!("UTC{}", local.format("%:z"))
    };
    format!("{} {}", local.format("%-m/%-d/%Y, %-I:%M:%S %p"), label)
}

/// Substitute every placeholder occurrence in `template`
pub fn render(template: &str, ctx: &MessageContext, offset: FixedOffset) -> String {
    template
        .replace(DEVICE_NAME, &ctx.target_name)
        .replace(DURATION, &ctx.duration_minutes.to_string())
        .replace(TIMESTAMP, &format_timestamp(ctx.timestamp, offset))
}
