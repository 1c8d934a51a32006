//! Keeps a channel session alive: connect with backoff, reconnect when lost

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::MessageChannel;
use crate::config::ChannelConfig;
use crate::error::ChannelError;

/// Delays between connection attempts, doubling up to `max_delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub ready_timeout: Duration,
}

impl ReconnectPolicy {
    pub fn from_config(config: &ChannelConfig) -> Self {
        let initial_delay = Duration::from_secs(config.reconnect_initial_seconds.max(1));
        Self {
            initial_delay,
            max_delay: Duration::from_secs(config.reconnect_max_seconds).max(initial_delay),
            ready_timeout: Duration::from_secs(config.ready_timeout_seconds),
        }
    }

    /// Delay before retry number `attempt` (0-indexed)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.initial_delay
            .checked_mul(2u32.saturating_pow(attempt))
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Owns the connect/reconnect cycle of one channel
#[derive(Debug)]
pub struct SessionKeeper {
    channel: Arc<dyn MessageChannel>,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
}

impl SessionKeeper {
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        policy: ReconnectPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            channel,
            policy,
            cancel,
        }
    }

    /// Retry `connect` until the channel is ready.
    ///
    /// Stops early on `AuthFailed`, which no retry can fix, and returns
    /// `NotReady` if cancelled first.
    pub async fn ensure_connected(&self) -> Result<(), ChannelError> {
        let mut attempt = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(ChannelError::NotReady);
            }

            let result = match self.channel.connect().await {
                Ok(()) => self.channel.wait_for_ready(self.policy.ready_timeout).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => return Ok(()),
                Err(ChannelError::AuthFailed(reason)) => {
                    return Err(ChannelError::AuthFailed(reason))
                }
                Err(e) => {
                    let delay = self.policy.delay(attempt);
                    tracing::warn!(
                        "Notification channel not ready ({}), retrying in {:?}",
                        e,
                        delay
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => return Err(ChannelError::NotReady),
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// Connect, send the optional greeting once, and reconnect whenever the
    /// session drops, until cancelled or the credentials are rejected
    pub async fn run(self, greeting: Option<(String, String)>) {
        let mut greeting = greeting;
        loop {
            match self.ensure_connected().await {
                Ok(()) => {}
                Err(ChannelError::AuthFailed(reason)) => {
                    tracing::error!(
                        "Notification channel rejected its credentials, giving up: {}",
                        reason
                    );
                    return;
                }
                Err(_) => return,
            }

            if let Some((recipient, message)) = greeting.take() {
                match self.channel.send_message(&recipient, &message).await {
                    Ok(()) => tracing::info!("Startup message sent to {}", recipient),
                    Err(e) => tracing::warn!("Failed to send startup message: {}", e),
                }
            }

            while self.channel.is_ready() {
                tokio::select! {
                    _ = tokio::time::sleep(self.policy.initial_delay) => {}
                    _ = self.cancel.cancelled() => return,
                }
            }
            tracing::warn!(
                "Notification channel lost its session ({}), reconnecting",
                self.channel.status().message
            );
        }
    }
}
