//! Cloudflare tunnel provider

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{check_response, network_error, ProviderKind, ReachabilityProvider};
use crate::config::CloudflareConfig;
use crate::error::ProviderError;
use crate::heuristic::{RawRecord, TunnelRecord};
use crate::io::HttpClient;

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

/// Cloudflare v4 response envelope
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    #[serde(default)]
    result: Option<Vec<TunnelRecord>>,
}

/// Reads tunnel health from the Cloudflare API
pub struct CloudflareProvider {
    api_token: String,
    tunnels_url: String,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("tunnels_url", &self.tunnels_url)
            .finish()
    }
}

impl CloudflareProvider {
    pub fn new(config: &CloudflareConfig, http: Arc<dyn HttpClient>) -> Self {
        let tunnels_url = format!(
            "{}/accounts/{}/cfd_tunnel?is_deleted=false",
            config.base_url.trim_end_matches('/'),
            config.account_id
        );

        tracing::debug!(
            "Created CloudflareProvider for account '{}'",
            config.account_id
        );

        Self {
            api_token: config.api_token.clone(),
            tunnels_url,
            http,
        }
    }
}

#[async_trait]
impl ReachabilityProvider for CloudflareProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloudflare
    }

    async fn fetch_all_targets(&self) -> Result<Vec<RawRecord>, ProviderError> {
        let response = self
            .http
            .get(&self.tunnels_url, &self.api_token)
            .await
            .map_err(network_error)?;
        let body = check_response(response, "tunnels")?;

        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Unknown(format!("Invalid tunnels response: {}", e)))?;

        if !envelope.success {
            let message = envelope
                .errors
                .into_iter()
                .next()
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(ProviderError::Unknown(format!("API Error: {}", message)));
        }

        let tunnels = envelope.result.unwrap_or_default();
        tracing::debug!("Account lists {} tunnels", tunnels.len());
        Ok(tunnels.into_iter().map(RawRecord::Tunnel).collect())
    }
}
