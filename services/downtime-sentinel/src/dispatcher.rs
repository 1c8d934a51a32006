//! Notification dispatch: render a template and deliver it to every recipient

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::MessageChannel;
use crate::clock::Clock;
use crate::config::NotificationConfig;
use crate::error::ChannelError;
use crate::state::StateHandle;
use crate::template::{self, MessageContext, TemplateId};

/// Delivery result for one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOutcome {
    pub recipient: String,
    pub result: Result<(), ChannelError>,
}

impl NotificationOutcome {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Record of a sent notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// `None` for messages sent through the control plane
    pub template: Option<TemplateId>,
    pub recipient: String,
    pub message: String,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Renders alert and recovery messages and sends them through the channel
#[derive(Debug)]
pub struct NotificationDispatcher {
    channel: Arc<dyn MessageChannel>,
    alert_template: String,
    recovery_template: String,
    offset: FixedOffset,
    clock: Arc<dyn Clock>,
    state: StateHandle,
}

impl NotificationDispatcher {
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        config: &NotificationConfig,
        clock: Arc<dyn Clock>,
        state: StateHandle,
    ) -> Self {
        Self {
            channel,
            alert_template: config.downtime_alert_message.clone(),
            recovery_template: config.recovery_message.clone(),
            offset: template::timestamp_offset(config.timestamp_utc_offset_minutes),
            clock,
            state,
        }
    }

    pub fn channel(&self) -> &Arc<dyn MessageChannel> {
        &self.channel
    }

    /// Render the configured template for `template`
    pub fn render(&self, template: TemplateId, ctx: &MessageContext) -> String {
        let text = match template {
            TemplateId::Alert => &self.alert_template,
            TemplateId::Recovery => &self.recovery_template,
        };
        template::render(text, ctx, self.offset)
    }

    /// Send the rendered template to each recipient in order.
    ///
    /// A failed send does not stop the others. Once the channel reports not
    /// ready, every remaining recipient is marked `NotReady` without a send.
    pub async fn dispatch(
        &self,
        template: TemplateId,
        recipients: &[String],
        ctx: &MessageContext,
    ) -> Vec<NotificationOutcome> {
        let message = self.render(template, ctx);
        let mut outcomes = Vec::with_capacity(recipients.len());
        let mut ready = true;

        for recipient in recipients {
            if ready && !self.channel.is_ready() {
                tracing::warn!("Notification channel is not ready, skipping remaining recipients");
                ready = false;
            }

            let result = if ready {
                self.channel.send_message(recipient, &message).await
            } else {
                Err(ChannelError::NotReady)
            };

            if result == Err(ChannelError::NotReady) {
                ready = false;
            }
            if let Err(e) = &result {
                tracing::warn!("Failed to send {} to {}: {}", template, recipient, e);
            } else {
                tracing::debug!("Sent {} to {}", template, recipient);
            }

            let outcome = NotificationOutcome {
                recipient: recipient.clone(),
                result,
            };
            self.record(Some(template), &outcome, &message, ctx.timestamp)
                .await;
            outcomes.push(outcome);
        }

        outcomes
    }

    /// Send `text` to `address` outside of any alert episode
    pub async fn send_direct(&self, address: &str, text: &str) -> NotificationOutcome {
        let result = if self.channel.is_ready() {
            self.channel.send_message(address, text).await
        } else {
            Err(ChannelError::NotReady)
        };

        if let Err(e) = &result {
            tracing::warn!("Direct message to {} failed: {}", address, e);
        }

        let outcome = NotificationOutcome {
            recipient: address.to_string(),
            result,
        };
        self.record(None, &outcome, text, self.clock.now()).await;
        outcome
    }

    async fn record(
        &self,
        template: Option<TemplateId>,
        outcome: &NotificationOutcome,
        message: &str,
        timestamp: DateTime<Utc>,
    ) {
        let record = NotificationRecord {
            template,
            recipient: outcome.recipient.clone(),
            message: message.to_string(),
            success: outcome.success(),
            error: outcome.result.as_ref().err().map(|e| e.to_string()),
            timestamp,
        };
        self.state.write().await.add_notification(record);
    }
}
