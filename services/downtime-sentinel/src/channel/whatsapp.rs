//! WhatsApp Cloud API channel

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use super::{ChannelStatus, MessageChannel};
use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::io::HttpClient;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Session {
    Connecting,
    Ready,
    AuthFailed(String),
    Closed(String),
}

/// Sends text messages through a WhatsApp Business phone number
pub struct WhatsAppChannel {
    access_token: String,
    phone_url: String,
    messages_url: String,
    http: Arc<dyn HttpClient>,
    session: watch::Sender<Session>,
}

impl std::fmt::Debug for WhatsAppChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppChannel")
            .field("phone_url", &self.phone_url)
            .field("session", &*self.session.borrow())
            .finish()
    }
}

impl WhatsAppChannel {
    pub fn new(config: &ChannelConfig, http: Arc<dyn HttpClient>) -> Self {
        let phone_url = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.phone_number_id
        );
        let messages_url = format!("{}/messages", phone_url);
        let (session, _) = watch::channel(Session::Connecting);

        Self {
            access_token: config.access_token.clone(),
            phone_url,
            messages_url,
            http,
            session,
        }
    }

    fn set_session(&self, session: Session) {
        self.session.send_replace(session);
    }
}

/// Strip formatting and any legacy `@c.us` suffix from a phone number
pub fn normalize_address(address: &str) -> String {
    address
        .trim()
        .trim_end_matches("@c.us")
        .chars()
        .filter(|c| !matches!(c, '+' | ' ' | '-'))
        .collect()
}

#[async_trait]
impl MessageChannel for WhatsAppChannel {
    fn is_ready(&self) -> bool {
        *self.session.borrow() == Session::Ready
    }

    fn status(&self) -> ChannelStatus {
        let message = match &*self.session.borrow() {
            Session::Ready => "Connected and ready".to_string(),
            Session::Connecting => "Connecting...".to_string(),
            Session::AuthFailed(_) => "Authentication failed".to_string(),
            Session::Closed(reason) => format!("Disconnected: {}", reason),
        };
        ChannelStatus {
            ready: self.is_ready(),
            message,
        }
    }

    async fn connect(&self) -> Result<(), ChannelError> {
        tracing::info!("Connecting WhatsApp channel");
        self.set_session(Session::Connecting);

        let response = self
            .http
            .get(&self.phone_url, &self.access_token)
            .await
            .map_err(|e| ChannelError::ConnectFailed(e.to_string()))?;

        match response.status {
            200..=299 => {
                tracing::info!("WhatsApp channel is ready");
                self.set_session(Session::Ready);
                Ok(())
            }
            401 | 403 => {
                tracing::error!("WhatsApp authentication failed: {}", response.body);
                self.set_session(Session::AuthFailed(response.body.clone()));
                Err(ChannelError::AuthFailed(response.body))
            }
            status => Err(ChannelError::ConnectFailed(format!(
                "Session check returned status {}: {}",
                status, response.body
            ))),
        }
    }

    async fn wait_for_ready(&self, timeout: Duration) -> Result<(), ChannelError> {
        let mut rx = self.session.subscribe();
        let wait = async move {
            loop {
                let current = rx.borrow_and_update().clone();
                match current {
                    Session::Ready => return Ok(()),
                    Session::AuthFailed(reason) => return Err(ChannelError::AuthFailed(reason)),
                    Session::Connecting | Session::Closed(_) => {}
                }
                if rx.changed().await.is_err() {
                    return Err(ChannelError::NotReady);
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| ChannelError::Timeout(timeout))?
    }

    async fn send_message(&self, address: &str, text: &str) -> Result<(), ChannelError> {
        if !self.is_ready() {
            return Err(ChannelError::NotReady);
        }

        let to = normalize_address(address);
        tracing::debug!("Sending message to {}", to);

        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": text },
        });

        let response = self
            .http
            .post_json(&self.messages_url, &self.access_token, &body)
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        match response.status {
            200..=299 => {
                tracing::debug!("Message delivered to {}", to);
                Ok(())
            }
            401 => {
                tracing::warn!("WhatsApp session closed: {}", response.body);
                self.set_session(Session::Closed("access token rejected".to_string()));
                Err(ChannelError::SendFailed(format!(
                    "status 401: {}",
                    response.body
                )))
            }
            status => Err(ChannelError::SendFailed(format!(
                "status {}: {}",
                status, response.body
            ))),
        }
    }
}
