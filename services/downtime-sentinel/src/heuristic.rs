//! Reachability heuristics
//!
//! Providers report noisy states: a tunnel flips to `degraded` or `down` on a
//! transient blip and a mesh device reports offline between keepalives. The
//! functions here turn one raw record into a [`TargetStatus`], trusting a
//! positive report immediately and treating a negative one as a soft signal
//! that recent activity or a live connection can overrule.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Recent-activity window for a `degraded` tunnel
pub const DEGRADED_ACTIVITY_MINUTES: f64 = 5.0;
/// Recent-activity window for a `down` or `inactive` tunnel
pub const DOWN_ACTIVITY_MINUTES: f64 = 2.0;
/// Recent-activity window for unrecognised tunnel states and mesh devices
pub const UNKNOWN_ACTIVITY_MINUTES: f64 = 10.0;

/// One connection of a tunnel as reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelConnection {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub colo_name: Option<String>,
    /// An absent flag reads as `Some(false)`; an explicit `null` stays `None`
    #[serde(default = "not_pending", deserialize_with = "Option::deserialize")]
    pub is_pending_reconnect: Option<bool>,
}

impl Default for TunnelConnection {
    fn default() -> Self {
        Self {
            id: None,
            colo_name: None,
            is_pending_reconnect: not_pending(),
        }
    }
}

impl TunnelConnection {
    /// Only a connection explicitly not pending, or without the flag, is active
    pub fn is_active(&self) -> bool {
        self.is_pending_reconnect == Some(false)
    }
}

fn not_pending() -> Option<bool> {
    Some(false)
}

/// A tunnel record as returned by the tunnel provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TunnelRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub conns_active_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub conns_inactive_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub connections: Vec<TunnelConnection>,
}

/// A device record as returned by the mesh provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub online: Option<bool>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub os: Option<String>,
}

/// A raw record from either provider
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    Tunnel(TunnelRecord),
    Device(DeviceRecord),
}

impl RawRecord {
    pub fn name(&self) -> &str {
        match self {
            RawRecord::Tunnel(t) => &t.name,
            RawRecord::Device(d) => &d.name,
        }
    }

    /// Evaluate this record against the matching heuristic
    pub fn evaluate(&self, now: DateTime<Utc>) -> TargetStatus {
        match self {
            RawRecord::Tunnel(t) => evaluate_tunnel(t, now),
            RawRecord::Device(d) => evaluate_device(d, now),
        }
    }
}

/// Provider-reported state before the heuristic is applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawState {
    Healthy,
    Degraded,
    Down,
    Inactive,
    Unknown(String),
    ReportedOnline,
    ReportedOffline,
}

impl RawState {
    fn from_tunnel_status(status: &str) -> Self {
        match status {
            "healthy" => RawState::Healthy,
            "degraded" => RawState::Degraded,
            "down" => RawState::Down,
            "inactive" => RawState::Inactive,
            other => RawState::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for RawState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawState::Healthy => write!(f, "healthy"),
            RawState::Degraded => write!(f, "degraded"),
            RawState::Down => write!(f, "down"),
            RawState::Inactive => write!(f, "inactive"),
            RawState::Unknown(s) => write!(f, "unknown ({})", s),
            RawState::ReportedOnline => write!(f, "reported online"),
            RawState::ReportedOffline => write!(f, "reported offline"),
        }
    }
}

/// Normalized reachability of one target, produced once per check.
///
/// Only built by [`evaluate_tunnel`] and [`evaluate_device`]; `online` is
/// private so no caller can set the verdict directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStatus {
    pub name: String,
    online: bool,
    pub raw_state: RawState,
    pub last_active_at: Option<DateTime<Utc>>,
    pub active_connection_count: usize,
}

impl TargetStatus {
    pub fn online(&self) -> bool {
        self.online
    }
}

fn minutes_ago(at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - at).num_milliseconds() as f64 / 60_000.0
}

fn recently_active(at: Option<DateTime<Utc>>, now: DateTime<Utc>, window: f64) -> Option<f64> {
    at.map(|at| minutes_ago(at, now))
        .filter(|minutes| *minutes < window)
}

/// Decide whether a tunnel is reachable
pub fn evaluate_tunnel(record: &TunnelRecord, now: DateTime<Utc>) -> TargetStatus {
    let raw_state = RawState::from_tunnel_status(&record.status);
    let active_connection_count = record.connections.iter().filter(|c| c.is_active()).count();

    let online = match raw_state {
        RawState::Healthy => true,
        RawState::Degraded | RawState::Down | RawState::Inactive => {
            tracing::debug!(
                "Tunnel status is {}, checking backup conditions",
                record.status
            );
            let window = if raw_state == RawState::Degraded {
                DEGRADED_ACTIVITY_MINUTES
            } else {
                DOWN_ACTIVITY_MINUTES
            };
            corroborate_tunnel(record, now, window, active_connection_count)
        }
        _ => {
            tracing::debug!(
                "Unknown tunnel status: {}, using backup checks",
                record.status
            );
            corroborate_tunnel(
                record,
                now,
                UNKNOWN_ACTIVITY_MINUTES,
                active_connection_count,
            )
        }
    };

    TargetStatus {
        name: record.name.clone(),
        online,
        raw_state,
        last_active_at: record.conns_active_at,
        active_connection_count,
    }
}

fn corroborate_tunnel(
    record: &TunnelRecord,
    now: DateTime<Utc>,
    window: f64,
    active_connections: usize,
) -> bool {
    if let Some(minutes) = recently_active(record.conns_active_at, now, window) {
        tracing::debug!(
            "Tunnel status is {} but was recently active ({} minutes ago), considering online",
            record.status,
            minutes.floor()
        );
        return true;
    }

    if active_connections > 0 {
        tracing::debug!(
            "Tunnel status is {} but has {} active connections, considering online",
            record.status,
            active_connections
        );
        return true;
    }

    tracing::debug!(
        "Tunnel status is {} with no active connections or recent activity, considering offline",
        record.status
    );
    false
}

/// Decide whether a mesh device is reachable
pub fn evaluate_device(record: &DeviceRecord, now: DateTime<Utc>) -> TargetStatus {
    let reported_online = record.online.unwrap_or(false);
    let raw_state = if reported_online {
        RawState::ReportedOnline
    } else {
        RawState::ReportedOffline
    };

    let online = if reported_online {
        true
    } else if let Some(minutes) =
        recently_active(record.last_seen, now, UNKNOWN_ACTIVITY_MINUTES)
    {
        tracing::debug!(
            "Device was recently active ({} minutes ago), considering online",
            minutes.floor()
        );
        true
    } else {
        // Addresses are a hint only; they never change the verdict.
        if !record.addresses.is_empty() {
            tracing::debug!("Device has IP addresses assigned, might be online despite API status");
        }
        false
    };

    TargetStatus {
        name: record.name.clone(),
        online,
        raw_state,
        last_active_at: record.last_seen,
        active_connection_count: record.addresses.len(),
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }))
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
