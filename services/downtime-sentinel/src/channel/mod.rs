//! Outbound messaging channel used for alerts

pub mod session;
pub mod whatsapp;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ChannelError;

pub use session::{ReconnectPolicy, SessionKeeper};
pub use whatsapp::WhatsAppChannel;

/// Readiness of a channel as shown on the health endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub ready: bool,
    pub message: String,
}

/// Trait for delivering text messages to an address
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait MessageChannel: Send + Sync + std::fmt::Debug {
    fn is_ready(&self) -> bool;

    fn status(&self) -> ChannelStatus;

    /// Establish the session. A rejected credential is reported as `AuthFailed`.
    async fn connect(&self) -> Result<(), ChannelError>;

    /// Resolve once the channel is ready, or fail after `timeout`
    async fn wait_for_ready(&self, timeout: Duration) -> Result<(), ChannelError>;

    /// Send `text` to `address`
    async fn send_message(&self, address: &str, text: &str) -> Result<(), ChannelError>;
}
