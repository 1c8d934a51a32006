//! Shared state published by the engine and read by the control plane

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::detector::MonitorSnapshot;
use crate::dispatcher::NotificationRecord;
use crate::heuristic::RawState;
use crate::provider::ProviderKind;

/// Outcome of the most recent check
#[derive(Debug, Clone, Serialize)]
pub struct LastCheck {
    pub at: DateTime<Utc>,
    pub raw_state: Option<RawState>,
    pub error: Option<String>,
}

/// Shared state accessible by engine and control plane
#[derive(Debug)]
pub struct SharedState {
    pub provider_kind: ProviderKind,
    pub monitor: MonitorSnapshot,
    pub last_check: Option<LastCheck>,
    pub consecutive_errors: u32,
    pub history: VecDeque<NotificationRecord>,
    pub history_max_size: usize,
    pub started_at: Instant,
}

impl SharedState {
    pub fn new(
        provider_kind: ProviderKind,
        monitor: MonitorSnapshot,
        history_max_size: usize,
    ) -> Self {
        Self {
            provider_kind,
            monitor,
            last_check: None,
            consecutive_errors: 0,
            history: VecDeque::with_capacity(history_max_size),
            history_max_size,
            started_at: Instant::now(),
        }
    }

    /// Publish the state machine after a successful check
    pub fn record_check(&mut self, monitor: MonitorSnapshot, raw_state: RawState, at: DateTime<Utc>) {
        self.monitor = monitor;
        self.consecutive_errors = 0;
        self.last_check = Some(LastCheck {
            at,
            raw_state: Some(raw_state),
            error: None,
        });
    }

    /// Note a failed check; the monitor snapshot is left as it was
    pub fn record_check_error(&mut self, error: String, at: DateTime<Utc>) -> u32 {
        self.consecutive_errors += 1;
        self.last_check = Some(LastCheck {
            at,
            raw_state: None,
            error: Some(error),
        });
        self.consecutive_errors
    }

    /// Add a notification to history
    pub fn add_notification(&mut self, record: NotificationRecord) {
        if self.history_max_size == 0 {
            return;
        }
        if self.history.len() >= self.history_max_size {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }
}

/// Thread-safe shared state handle
pub type StateHandle = Arc<RwLock<SharedState>>;

pub fn new_state_handle(
    provider_kind: ProviderKind,
    monitor: MonitorSnapshot,
    history_max_size: usize,
) -> StateHandle {
    Arc::new(RwLock::new(SharedState::new(
        provider_kind,
        monitor,
        history_max_size,
    )))
}
