//! Error types for the downtime sentinel service

/// Failures talking to a reachability provider
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Invalid API token or insufficient permissions: {0}")]
    Auth(String),

    #[error("Access denied, check account permissions: {0}")]
    Forbidden(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Target {name} not found. Available targets: {}", available.join(", "))]
    NotFound { name: String, available: Vec<String> },

    #[error("Provider error: {0}")]
    Unknown(String),
}

/// Failures delivering a message through the notification channel
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Notification channel is not ready")]
    NotReady,

    #[error("Timed out after {0:?} waiting for the notification channel")]
    Timeout(std::time::Duration),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),
}

/// Invalid or ambiguous configuration, fatal at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    MissingField(&'static str),

    #[error("Cannot use both Tailscale and Cloudflare configurations. Choose one.")]
    ConflictingProviders,

    #[error("Must configure either Tailscale (api_key, tailnet) or Cloudflare (api_token, account_id)")]
    NoProvider,

    #[error("{0} must be a positive number")]
    InvalidThreshold(&'static str),

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors that can occur in the downtime sentinel service
#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Control plane error: {0}")]
    Api(String),
}

/// Result type alias for sentinel operations
pub type Result<T> = std::result::Result<T, SentinelError>;
