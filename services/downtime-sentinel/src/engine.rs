//! Engine: runs the state machine on the configured schedule

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::detector::{AlertStateMachine, TickReport};
use crate::dispatcher::NotificationDispatcher;
use crate::provider::ReachabilityProvider;
use crate::schedule::Schedule;
use crate::state::StateHandle;

/// Consecutive failed checks after which a warning is logged
const ERROR_STREAK_WARNING: u32 = 5;

/// The engine owns the state machine and runs one tick at a time
pub struct Engine {
    machine: AlertStateMachine,
    provider: Arc<dyn ReachabilityProvider>,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    schedule: Schedule,
    state: StateHandle,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(
        machine: AlertStateMachine,
        provider: Arc<dyn ReachabilityProvider>,
        dispatcher: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        schedule: Schedule,
        state: StateHandle,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            machine,
            provider,
            dispatcher,
            clock,
            schedule,
            state,
            cancel,
        }
    }

    pub fn machine(&self) -> &AlertStateMachine {
        &self.machine
    }

    /// Run one check and publish the result
    pub async fn tick(&mut self) -> Option<TickReport> {
        let now = self.clock.now();
        let result = self
            .machine
            .on_tick(self.provider.as_ref(), &self.dispatcher, now)
            .await;

        let mut state = self.state.write().await;
        match result {
            Ok(report) => {
                tracing::debug!(
                    "Tick for '{}': {} -> {} ({} actions)",
                    self.machine.target_name(),
                    report.status.raw_state,
                    report.phase,
                    report.actions.len()
                );
                state.record_check(self.machine.snapshot(), report.status.raw_state.clone(), now);
                Some(report)
            }
            Err(e) => {
                let errors = state.record_check_error(e.to_string(), now);
                if errors == ERROR_STREAK_WARNING {
                    tracing::warn!(
                        "Checks for '{}' have failed {} times in a row",
                        self.machine.target_name(),
                        errors
                    );
                }
                None
            }
        }
    }

    /// Tick immediately, then on every schedule slot until cancelled
    pub async fn run(&mut self) {
        tracing::info!(
            "Monitoring '{}' via {}",
            self.machine.target_name(),
            self.provider.kind()
        );

        loop {
            self.tick().await;

            let delay = self.schedule.delay_until_next(self.clock.now());
            tracing::debug!("Next check in {:?}", delay);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Monitoring loop cancelled");
                    break;
                }
            }
        }
    }
}
