//! Tailscale mesh-device provider

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{check_response, network_error, ProviderKind, ReachabilityProvider};
use crate::config::TailscaleConfig;
use crate::error::ProviderError;
use crate::heuristic::{DeviceRecord, RawRecord};
use crate::io::HttpClient;

#[derive(Debug, Deserialize)]
struct DeviceList {
    #[serde(default)]
    devices: Vec<DeviceRecord>,
}

/// Reads device reachability from the Tailscale API
pub struct TailscaleProvider {
    api_key: String,
    devices_url: String,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for TailscaleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailscaleProvider")
            .field("devices_url", &self.devices_url)
            .finish()
    }
}

impl TailscaleProvider {
    pub fn new(config: &TailscaleConfig, http: Arc<dyn HttpClient>) -> Self {
        let devices_url = format!(
            "{}/tailnet/{}/devices?fields=all",
            config.base_url.trim_end_matches('/'),
            config.tailnet
        );

        tracing::debug!("Created TailscaleProvider for tailnet '{}'", config.tailnet);

        Self {
            api_key: config.api_key.clone(),
            devices_url,
            http,
        }
    }
}

#[async_trait]
impl ReachabilityProvider for TailscaleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Tailscale
    }

    async fn fetch_all_targets(&self) -> Result<Vec<RawRecord>, ProviderError> {
        let response = self
            .http
            .get(&self.devices_url, &self.api_key)
            .await
            .map_err(network_error)?;
        let body = check_response(response, "devices")?;

        let list: DeviceList = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Unknown(format!("Invalid devices response: {}", e)))?;

        tracing::debug!("Tailnet lists {} devices", list.devices.len());
        Ok(list.devices.into_iter().map(RawRecord::Device).collect())
    }
}
