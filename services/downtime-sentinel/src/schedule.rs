//! When the next reachability check should run

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::ScheduleConfig;
use crate::error::ConfigError;

/// Check cadence: a fixed interval or a cron expression
#[derive(Debug, Clone)]
pub enum Schedule {
    Every(Duration),
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    /// Build from configuration; a cron expression wins over the interval
    pub fn from_config(config: &ScheduleConfig) -> Result<Self, ConfigError> {
        match config.cron_expression.as_deref().map(str::trim) {
            Some(expr) if !expr.is_empty() => Self::parse_cron(expr),
            _ => config
                .check_interval_minutes
                .checked_mul(60)
                .map(|secs| Schedule::Every(Duration::from_secs(secs)))
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "check_interval_minutes",
                    value: config.check_interval_minutes.to_string(),
                }),
        }
    }

    /// Parse a cron expression; five-field expressions run at second zero
    pub fn parse_cron(expression: &str) -> Result<Self, ConfigError> {
        let fields = expression.split_whitespace().count();
        let normalized = if fields == 5 {
            format!("0 {}", expression)
        } else {
            expression.to_string()
        };

        cron::Schedule::from_str(&normalized)
            .map(|s| Schedule::Cron(Box::new(s)))
            .map_err(|e| ConfigError::InvalidCron {
                expression: expression.to_string(),
                reason: e.to_string(),
            })
    }

    /// How long to wait after `now` before the next check
    pub fn delay_until_next(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Schedule::Every(interval) => *interval,
            Schedule::Cron(schedule) => schedule
                .after(&now)
                .next()
                .and_then(|next| (next - now).to_std().ok())
                .unwrap_or(Duration::from_secs(60)),
        }
    }
}
