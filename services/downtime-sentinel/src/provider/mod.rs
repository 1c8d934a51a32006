//! Reachability providers
//!
//! A provider lists the targets a vendor API knows about, picks the watched
//! one by name, and reduces it to a [`TargetStatus`] through the heuristics.

pub mod cloudflare;
pub mod tailscale;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{ConfigError, ProviderError};
use crate::heuristic::{RawRecord, TargetStatus};
use crate::io::{HttpClient, HttpResponse};

pub use cloudflare::CloudflareProvider;
pub use tailscale::TailscaleProvider;

/// Which vendor API a provider talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Tailscale,
    Cloudflare,
}

impl ProviderKind {
    /// Noun used for the target in log lines
    pub fn target_label(&self) -> &'static str {
        match self {
            ProviderKind::Tailscale => "Device",
            ProviderKind::Cloudflare => "Tunnel",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Tailscale => write!(f, "tailscale"),
            ProviderKind::Cloudflare => write!(f, "cloudflare"),
        }
    }
}

/// Result of a provider connectivity test
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub message: String,
}

/// Trait for querying a reachability provider
#[async_trait]
pub trait ReachabilityProvider: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> ProviderKind;

    /// Fetch every target the provider knows about, in one API call
    async fn fetch_all_targets(&self) -> Result<Vec<RawRecord>, ProviderError>;

    /// Find the target called `name`, exact match first, then fuzzy
    async fn resolve_target(&self, name: &str) -> Result<RawRecord, ProviderError> {
        let records = self.fetch_all_targets().await?;
        find_target(records, name)
    }

    /// Resolve `name` and evaluate it at `now`
    async fn check_status(
        &self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<TargetStatus, ProviderError> {
        let record = self.resolve_target(name).await?;
        Ok(record.evaluate(now))
    }

    /// Best-effort verdict: any failure is logged and reported as offline
    async fn is_online(&self, name: &str, now: DateTime<Utc>) -> bool {
        match self.check_status(name, now).await {
            Ok(status) => status.online(),
            Err(e) => {
                tracing::error!(
                    "Error checking {} status: {}",
                    self.kind().target_label().to_lowercase(),
                    e
                );
                false
            }
        }
    }

    /// Check that credentials work by listing targets once
    async fn test_connection(&self) -> ConnectionTest {
        match self.fetch_all_targets().await {
            Ok(_) => ConnectionTest {
                success: true,
                message: "Connected successfully".to_string(),
            },
            Err(e) => ConnectionTest {
                success: false,
                message: e.to_string(),
            },
        }
    }
}

/// Build the provider selected by the configuration
pub fn build_provider(
    config: &Config,
    http: Arc<dyn HttpClient>,
) -> Result<Arc<dyn ReachabilityProvider>, ConfigError> {
    let provider: Arc<dyn ReachabilityProvider> = match config.provider_kind()? {
        ProviderKind::Tailscale => {
            let ts = config
                .tailscale
                .as_ref()
                .ok_or(ConfigError::MissingField("tailscale"))?;
            Arc::new(TailscaleProvider::new(ts, http))
        }
        ProviderKind::Cloudflare => {
            let cf = config
                .cloudflare
                .as_ref()
                .ok_or(ConfigError::MissingField("cloudflare"))?;
            Arc::new(CloudflareProvider::new(cf, http))
        }
    };
    tracing::debug!("Using {} provider", provider.kind());
    Ok(provider)
}

fn candidate_names(record: &RawRecord) -> Vec<&str> {
    match record {
        RawRecord::Tunnel(t) => vec![t.name.as_str()],
        RawRecord::Device(d) => vec![d.name.as_str(), d.hostname.as_str()],
    }
}

/// Human-readable label used when listing available targets
pub fn describe_record(record: &RawRecord) -> String {
    match record {
        RawRecord::Tunnel(t) => format!("\"{}\"", t.name),
        RawRecord::Device(d) => format!("\"{}\" ({})", d.name, d.hostname),
    }
}

/// Pick `name` out of `records`.
///
/// Exact match wins. Otherwise the first record whose name contains `name`,
/// or is contained by it, case-insensitively. Empty candidate names never
/// match fuzzily.
pub fn find_target(mut records: Vec<RawRecord>, name: &str) -> Result<RawRecord, ProviderError> {
    if let Some(pos) = records
        .iter()
        .position(|r| candidate_names(r).contains(&name))
    {
        return Ok(records.swap_remove(pos));
    }

    let search = name.to_lowercase();
    let fuzzy = records.iter().position(|r| {
        candidate_names(r)
            .into_iter()
            .filter(|c| !c.is_empty())
            .map(str::to_lowercase)
            .any(|c| c.contains(&search) || search.contains(&c))
    });

    match fuzzy {
        Some(pos) => Ok(records.swap_remove(pos)),
        None => Err(ProviderError::NotFound {
            name: name.to_string(),
            available: records.iter().map(describe_record).collect(),
        }),
    }
}

/// Map a vendor response to its body, classifying failures by status
pub(crate) fn check_response(response: HttpResponse, what: &str) -> Result<String, ProviderError> {
    match response.status {
        200..=299 => Ok(response.body),
        401 => Err(ProviderError::Auth(response.body)),
        403 => Err(ProviderError::Forbidden(response.body)),
        status => Err(ProviderError::Unknown(format!(
            "Failed to fetch {}: status {}: {}",
            what, status, response.body
        ))),
    }
}

/// Transport-level failures become network errors
pub(crate) fn network_error(err: crate::SentinelError) -> ProviderError {
    ProviderError::Network(err.to_string())
}
