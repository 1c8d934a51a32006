//! Configuration types for the downtime sentinel service
//!
//! Configuration comes from an optional JSON file, overlaid with the
//! environment variables the service has always understood, and is then
//! validated once before monitoring starts.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::provider::ProviderKind;
use crate::schedule::Schedule;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub tailscale: Option<TailscaleConfig>,
    #[serde(default)]
    pub cloudflare: Option<CloudflareConfig>,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// The single watched target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_target_name")]
    pub name: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            name: default_target_name(),
        }
    }
}

/// Tailscale mesh-device provider credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TailscaleConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub tailnet: String,
    #[serde(default = "default_tailscale_url")]
    pub base_url: String,
}

impl TailscaleConfig {
    fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.tailnet.is_empty()
    }
}

/// Cloudflare tunnel provider credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudflareConfig {
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub account_id: String,
    /// Overrides `target.name` when set
    #[serde(default)]
    pub tunnel_name: Option<String>,
    #[serde(default = "default_cloudflare_url")]
    pub base_url: String,
}

impl CloudflareConfig {
    fn is_complete(&self) -> bool {
        !self.api_token.is_empty() && !self.account_id.is_empty()
    }
}

/// Settings shared by both providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Check cadence and alert policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_minutes: u64,
    /// Takes precedence over `check_interval_minutes` when set
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold_minutes: u64,
    #[serde(default = "default_repeat_interval")]
    pub repeat_alert_interval_minutes: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: default_check_interval(),
            cron_expression: None,
            alert_threshold_minutes: default_alert_threshold(),
            repeat_alert_interval_minutes: default_repeat_interval(),
        }
    }
}

/// Recipients and message templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default = "default_downtime_message")]
    pub downtime_alert_message: String,
    #[serde(default = "default_recovery_message")]
    pub recovery_message: String,
    /// Fixed offset used to render `{{timestamp}}`
    #[serde(default)]
    pub timestamp_utc_offset_minutes: i32,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            downtime_alert_message: default_downtime_message(),
            recovery_message: default_recovery_message(),
            timestamp_utc_offset_minutes: 0,
            history_size: default_history_size(),
        }
    }
}

/// WhatsApp Cloud API channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub phone_number_id: String,
    #[serde(default = "default_whatsapp_url")]
    pub base_url: String,
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_seconds: u64,
    /// First reconnect delay; doubles on each failed attempt
    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial_seconds: u64,
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_seconds: u64,
    #[serde(default)]
    pub startup_recipient: Option<String>,
    #[serde(default)]
    pub startup_message: Option<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            phone_number_id: String::new(),
            base_url: default_whatsapp_url(),
            ready_timeout_seconds: default_ready_timeout(),
            reconnect_initial_seconds: default_reconnect_initial(),
            reconnect_max_seconds: default_reconnect_max(),
            startup_recipient: None,
            startup_message: None,
        }
    }
}

/// HTTP control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key: None,
            port: default_api_port(),
        }
    }
}

impl Config {
    /// Name of the watched target; a configured tunnel name wins
    pub fn target_name(&self) -> &str {
        self.cloudflare
            .as_ref()
            .and_then(|c| c.tunnel_name.as_deref())
            .filter(|n| !n.is_empty())
            .unwrap_or(self.target.name.as_str())
    }

    /// Overlay settings from the process environment
    pub fn resolve_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Overlay settings from `lookup`, treating empty values as unset
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let tailscale_key = var("TAILSCALE_API_KEY");
        let tailnet = var("TAILSCALE_TAILNET");
        if tailscale_key.is_some() || tailnet.is_some() {
            let ts = self.tailscale.get_or_insert_with(|| TailscaleConfig {
                base_url: default_tailscale_url(),
                ..TailscaleConfig::default()
            });
            if let Some(v) = tailscale_key {
                ts.api_key = v;
            }
            if let Some(v) = tailnet {
                ts.tailnet = v;
            }
        }

        let cf_token = var("CLOUDFLARE_API_TOKEN");
        let cf_account = var("CLOUDFLARE_ACCOUNT_ID");
        let cf_tunnel = var("CLOUDFLARE_TUNNEL_NAME");
        if cf_token.is_some() || cf_account.is_some() || cf_tunnel.is_some() {
            let cf = self.cloudflare.get_or_insert_with(|| CloudflareConfig {
                base_url: default_cloudflare_url(),
                ..CloudflareConfig::default()
            });
            if let Some(v) = cf_token {
                cf.api_token = v;
            }
            if let Some(v) = cf_account {
                cf.account_id = v;
            }
            if cf_tunnel.is_some() {
                cf.tunnel_name = cf_tunnel;
            }
        }

        if let Some(v) = var("DEVICE_NAME") {
            self.target.name = v;
        }
        if let Some(v) = var("VENDOR_PHONE_NUMBER") {
            self.notifications.recipients = v
                .split(',')
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect();
        }
        if let Some(v) = var("DOWNTIME_ALERT_MESSAGE") {
            self.notifications.downtime_alert_message = unescape_newlines(&v);
        }
        if let Some(v) = var("RECOVERY_MESSAGE") {
            self.notifications.recovery_message = unescape_newlines(&v);
        }
        if let Some(v) = var("REPEAT_ALERT_INTERVAL_MINUTES") {
            self.schedule.repeat_alert_interval_minutes =
                parse_number("REPEAT_ALERT_INTERVAL_MINUTES", &v)?;
        }
        if let Some(v) = var("ALERT_THRESHOLD_MINUTES") {
            self.schedule.alert_threshold_minutes = parse_number("ALERT_THRESHOLD_MINUTES", &v)?;
        }
        if let Some(v) = var("CHECK_INTERVAL_MINUTES") {
            self.schedule.check_interval_minutes = parse_number("CHECK_INTERVAL_MINUTES", &v)?;
        }
        if let Some(v) = var("CRON_EXPRESSION") {
            self.schedule.cron_expression = Some(v);
        }
        if let Some(v) = var("API_KEY") {
            self.api.key = Some(v);
        }
        if let Some(v) = var("API_PORT") {
            self.api.port = parse_number("API_PORT", &v)?;
        }
        if let Some(v) = var("WHATSAPP_ACCESS_TOKEN") {
            self.channel.access_token = v;
        }
        if let Some(v) = var("WHATSAPP_PHONE_NUMBER_ID") {
            self.channel.phone_number_id = v;
        }

        Ok(())
    }

    /// Which provider the credentials select. Exactly one must be configured.
    pub fn provider_kind(&self) -> Result<ProviderKind, ConfigError> {
        let using_tailscale = self.tailscale.as_ref().is_some_and(|t| t.is_complete());
        let using_cloudflare = self.cloudflare.as_ref().is_some_and(|c| c.is_complete());

        match (using_tailscale, using_cloudflare) {
            (true, true) => Err(ConfigError::ConflictingProviders),
            (false, false) => Err(ConfigError::NoProvider),
            (true, false) => Ok(ProviderKind::Tailscale),
            (false, true) => Ok(ProviderKind::Cloudflare),
        }
    }

    /// Check the whole configuration and return which provider it selects
    pub fn validate(&self) -> Result<ProviderKind, ConfigError> {
        let kind = self.provider_kind()?;

        if self.target_name().trim().is_empty() {
            return Err(ConfigError::MissingField("target.name"));
        }
        if self.notifications.recipients.is_empty() {
            return Err(ConfigError::MissingField("notifications.recipients"));
        }
        if self.api.enabled && self.api.key.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::MissingField("api.key"));
        }
        if self.channel.access_token.is_empty() {
            return Err(ConfigError::MissingField("channel.access_token"));
        }
        if self.channel.phone_number_id.is_empty() {
            return Err(ConfigError::MissingField("channel.phone_number_id"));
        }
        if self.schedule.alert_threshold_minutes < 1 {
            return Err(ConfigError::InvalidThreshold("alert_threshold_minutes"));
        }
        if self.schedule.check_interval_minutes < 1 {
            return Err(ConfigError::InvalidThreshold("check_interval_minutes"));
        }
        Schedule::from_config(&self.schedule)?;

        Ok(kind)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
}

fn unescape_newlines(s: &str) -> String {
    s.replace("\\n", "\n")
}

fn default_target_name() -> String {
    "apple-tv".to_string()
}

fn default_tailscale_url() -> String {
    "https://api.tailscale.com/api/v2".to_string()
}

fn default_cloudflare_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_whatsapp_url() -> String {
    "https://graph.facebook.com/v21.0".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

fn default_ready_timeout() -> u64 {
    60
}

fn default_reconnect_initial() -> u64 {
    5
}

fn default_reconnect_max() -> u64 {
    300
}

fn default_check_interval() -> u64 {
    5
}

fn default_alert_threshold() -> u64 {
    5
}

fn default_repeat_interval() -> u64 {
    60
}

fn default_history_size() -> usize {
    100
}

fn default_api_port() -> u16 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_downtime_message() -> String {
    "🚨 INTERNET DOWNTIME ALERT 🚨\n\nDevice: {{deviceName}}\nStatus: OFFLINE\nDuration: {{duration}} minutes\n\nPlease check the internet connection immediately.\n\nTime: {{timestamp}}".to_string()
}

fn default_recovery_message() -> String {
    "✅ INTERNET RECOVERED\n\nDevice: {{deviceName}}\nStatus: ONLINE\nDowntime Duration: {{duration}} minutes\n\nConnection has been restored.\n\nTime: {{timestamp}}".to_string()
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = serde_json::from_str(&content).map_err(ConfigError::Parse)?;
    Ok(config)
}
