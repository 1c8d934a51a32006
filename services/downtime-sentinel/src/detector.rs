//! Alert state machine
//!
//! Turns the stream of online/offline verdicts for the watched target into
//! downtime alerts, repeat alerts and a single recovery notice per episode.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::elapsed_minutes;
use crate::config::Config;
use crate::dispatcher::{NotificationDispatcher, NotificationOutcome};
use crate::heuristic::TargetStatus;
use crate::provider::ReachabilityProvider;
use crate::template::{MessageContext, TemplateId};

/// Alert timing policy, in whole minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    pub threshold_minutes: i64,
    pub repeat_interval_minutes: i64,
}

impl AlertPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold_minutes: to_minutes(config.schedule.alert_threshold_minutes),
            repeat_interval_minutes: to_minutes(config.schedule.repeat_alert_interval_minutes),
        }
    }
}

fn to_minutes(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Where the target is in its current episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Online,
    OfflineAwaitingThreshold,
    OfflineAlerted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Online => write!(f, "online"),
            Phase::OfflineAwaitingThreshold => write!(f, "offline (awaiting threshold)"),
            Phase::OfflineAlerted => write!(f, "offline (alerted)"),
        }
    }
}

/// A notification the state machine wants sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertAction {
    Downtime { duration_minutes: i64 },
    Recovery { duration_minutes: i64 },
}

impl AlertAction {
    pub fn template(&self) -> TemplateId {
        match self {
            AlertAction::Downtime { .. } => TemplateId::Alert,
            AlertAction::Recovery { .. } => TemplateId::Recovery,
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        match self {
            AlertAction::Downtime { duration_minutes }
            | AlertAction::Recovery { duration_minutes } => *duration_minutes,
        }
    }
}

/// Episode bookkeeping for the watched target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorState {
    pub is_online: bool,
    pub last_online_at: DateTime<Utc>,
    pub down_since: Option<DateTime<Utc>>,
    pub alert_sent: bool,
    pub last_alert_at: Option<DateTime<Utc>>,
    pub recovery_notified: bool,
}

impl MonitorState {
    /// The target is assumed online at startup
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            is_online: true,
            last_online_at: now,
            down_since: None,
            alert_sent: false,
            last_alert_at: None,
            recovery_notified: false,
        }
    }

    pub fn phase(&self) -> Phase {
        match (self.is_online, self.alert_sent) {
            (true, _) => Phase::Online,
            (false, false) => Phase::OfflineAwaitingThreshold,
            (false, true) => Phase::OfflineAlerted,
        }
    }

    pub fn snapshot(&self, target_name: &str) -> MonitorSnapshot {
        MonitorSnapshot {
            target_name: target_name.to_string(),
            is_online: self.is_online,
            phase: self.phase(),
            down_since: self.down_since,
            alert_sent: self.alert_sent,
            last_alert_at: self.last_alert_at,
            last_online_at: self.last_online_at,
        }
    }

    fn reset_episode(&mut self) {
        self.alert_sent = false;
        self.last_alert_at = None;
        self.recovery_notified = false;
    }
}

/// Read-only copy of the state machine for the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorSnapshot {
    pub target_name: String,
    pub is_online: bool,
    pub phase: Phase,
    pub down_since: Option<DateTime<Utc>>,
    pub alert_sent: bool,
    pub last_alert_at: Option<DateTime<Utc>>,
    pub last_online_at: DateTime<Utc>,
}

/// What happened during one tick
#[derive(Debug, Clone)]
pub struct TickReport {
    pub status: TargetStatus,
    pub phase: Phase,
    pub actions: Vec<AlertAction>,
    pub outcomes: Vec<NotificationOutcome>,
}

/// Drives alerts for one target
#[derive(Debug)]
pub struct AlertStateMachine {
    target_name: String,
    target_label: &'static str,
    recipients: Vec<String>,
    policy: AlertPolicy,
    state: MonitorState,
}

impl AlertStateMachine {
    pub fn new(
        target_name: impl Into<String>,
        recipients: Vec<String>,
        policy: AlertPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            target_name: target_name.into(),
            target_label: "Target",
            recipients,
            policy,
            state: MonitorState::new(now),
        }
    }

    /// Noun used in log lines, e.g. "Device" or "Tunnel"
    pub fn with_target_label(mut self, label: &'static str) -> Self {
        self.target_label = label;
        self
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.state.snapshot(&self.target_name)
    }

    /// Apply one verdict and return the notifications it calls for
    pub fn on_observation(&mut self, online: bool, now: DateTime<Utc>) -> Vec<AlertAction> {
        let mut actions = Vec::new();

        match (self.state.is_online, online) {
            (true, true) => {
                self.state.last_online_at = now;
            }
            (true, false) => {
                tracing::info!("{} {} went offline", self.target_label, self.target_name);
                self.state.is_online = false;
                self.state.down_since = Some(now);
                self.state.reset_episode();
            }
            (false, false) => {
                let down_since = *self.state.down_since.get_or_insert(now);
                let minutes = elapsed_minutes(down_since, now);

                if !self.state.alert_sent && minutes >= self.policy.threshold_minutes {
                    tracing::info!(
                        "{} has been offline for {} minutes, sending initial alert",
                        self.target_label,
                        minutes
                    );
                    actions.push(AlertAction::Downtime {
                        duration_minutes: minutes,
                    });
                    self.state.alert_sent = true;
                    self.state.last_alert_at = Some(now);
                }

                if let (true, Some(last_alert)) = (self.state.alert_sent, self.state.last_alert_at) {
                    if elapsed_minutes(last_alert, now) >= self.policy.repeat_interval_minutes {
                        tracing::info!(
                            "{} still offline after {} minutes, sending repeat alert",
                            self.target_label,
                            minutes
                        );
                        actions.push(AlertAction::Downtime {
                            duration_minutes: minutes,
                        });
                        self.state.last_alert_at = Some(now);
                    }
                }
            }
            (false, true) => {
                let minutes = self
                    .state
                    .down_since
                    .map(|since| elapsed_minutes(since, now))
                    .unwrap_or(0);
                tracing::info!(
                    "{} {} is back online after {} minutes",
                    self.target_label,
                    self.target_name,
                    minutes
                );

                if self.state.alert_sent && !self.state.recovery_notified {
                    actions.push(AlertAction::Recovery {
                        duration_minutes: minutes,
                    });
                    self.state.recovery_notified = true;
                }

                self.state.is_online = true;
                self.state.last_online_at = now;
                self.state.down_since = None;
                self.state.reset_episode();
            }
        }

        actions
    }

    /// Check the target once and deliver whatever the verdict calls for.
    ///
    /// A provider failure is logged and leaves the state untouched; it never
    /// counts as an offline observation.
    pub async fn on_tick(
        &mut self,
        provider: &dyn ReachabilityProvider,
        dispatcher: &NotificationDispatcher,
        now: DateTime<Utc>,
    ) -> Result<TickReport, crate::error::ProviderError> {
        let status = match provider.check_status(&self.target_name, now).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(
                    "Error checking {} status: {}",
                    self.target_label.to_lowercase(),
                    e
                );
                return Err(e);
            }
        };

        let actions = self.on_observation(status.online(), now);
        let mut outcomes = Vec::new();

        for action in &actions {
            let ctx = MessageContext {
                target_name: self.target_name.clone(),
                duration_minutes: action.duration_minutes(),
                timestamp: now,
            };
            let sent = dispatcher
                .dispatch(action.template(), &self.recipients, &ctx)
                .await;
            log_delivery(action, &sent);
            outcomes.extend(sent);
        }

        self.log_status(now);

        Ok(TickReport {
            status,
            phase: self.state.phase(),
            actions,
            outcomes,
        })
    }

    fn log_status(&self, now: DateTime<Utc>) {
        match self.state.down_since {
            Some(since) if !self.state.is_online => tracing::info!(
                "{}: OFFLINE ({} minutes)",
                self.target_name,
                elapsed_minutes(since, now)
            ),
            _ => tracing::info!("{}: ONLINE", self.target_name),
        }
    }
}

fn log_delivery(action: &AlertAction, outcomes: &[NotificationOutcome]) {
    let kind = match action {
        AlertAction::Downtime { .. } => "Downtime alert",
        AlertAction::Recovery { .. } => "Recovery notification",
    };
    let delivered = outcomes.iter().filter(|o| o.success()).count();
    if delivered > 0 {
        tracing::info!(
            "{} sent to {} of {} recipients",
            kind,
            delivered,
            outcomes.len()
        );
    } else {
        tracing::error!("{} failed to reach any recipient", kind);
    }
}
