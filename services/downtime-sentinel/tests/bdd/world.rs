//! BDD test world for the downtime sentinel service

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cucumber::World;

use downtime_sentinel::channel::{ChannelStatus, MessageChannel};
use downtime_sentinel::clock::ManualClock;
use downtime_sentinel::config::{ApiConfig, ChannelConfig, NotificationConfig, TailscaleConfig};
use downtime_sentinel::detector::TickReport;
use downtime_sentinel::error::{ChannelError, ProviderError};
use downtime_sentinel::heuristic::{DeviceRecord, RawRecord, TargetStatus, TunnelRecord};
use downtime_sentinel::provider::{ProviderKind, ReachabilityProvider};
use downtime_sentinel::{Config, Sentinel, SentinelBuilder};

pub const API_KEY: &str = "bdd-secret";

/// Fixed start of every scenario's timeline
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Mesh provider whose single device reports whatever the scenario says
#[derive(Debug)]
pub struct FakeProvider {
    device_name: String,
    next: Mutex<Result<bool, ProviderError>>,
}

impl FakeProvider {
    pub fn new(device_name: &str) -> Self {
        Self {
            device_name: device_name.to_string(),
            next: Mutex::new(Ok(true)),
        }
    }

    pub fn report(&self, next: Result<bool, ProviderError>) {
        *self.next.lock().unwrap() = next;
    }
}

#[async_trait]
impl ReachabilityProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Tailscale
    }

    async fn fetch_all_targets(&self) -> Result<Vec<RawRecord>, ProviderError> {
        let online = self.next.lock().unwrap().clone()?;
        Ok(vec![RawRecord::Device(DeviceRecord {
            name: format!("{}.tail0000.ts.net", self.device_name),
            hostname: self.device_name.clone(),
            online: Some(online),
            ..DeviceRecord::default()
        })])
    }
}

/// Channel that records every message it is asked to deliver
#[derive(Debug, Default)]
pub struct RecordingChannel {
    ready: AtomicBool,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingChannel {
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageChannel for RecordingChannel {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn status(&self) -> ChannelStatus {
        let ready = self.is_ready();
        ChannelStatus {
            ready,
            message: if ready { "Connected and ready" } else { "Connecting..." }.to_string(),
        }
    }

    async fn connect(&self) -> Result<(), ChannelError> {
        self.set_ready(true);
        Ok(())
    }

    async fn wait_for_ready(&self, timeout: Duration) -> Result<(), ChannelError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(ChannelError::Timeout(timeout))
        }
    }

    async fn send_message(&self, address: &str, text: &str) -> Result<(), ChannelError> {
        if !self.is_ready() {
            return Err(ChannelError::NotReady);
        }
        self.sent
            .lock()
            .unwrap()
            .push((address.to_string(), text.to_string()));
        Ok(())
    }
}

#[derive(Debug, Default, World)]
pub struct DowntimeWorld {
    // Heuristic evaluation
    pub tunnel: Option<TunnelRecord>,
    pub device: Option<DeviceRecord>,
    pub verdict: Option<TargetStatus>,

    // Alerting
    pub target_name: Option<String>,
    pub threshold_minutes: u64,
    pub repeat_minutes: u64,
    pub recipients: Vec<String>,
    pub channel_ready: Option<bool>,
    pub provider: Option<Arc<FakeProvider>>,
    pub channel: Option<Arc<RecordingChannel>>,
    pub clock: Option<Arc<ManualClock>>,
    pub sentinel: Option<SentinelSlot>,
    pub last_report: Option<TickReport>,

    // Control plane
    pub response_status: Option<u16>,
    pub response_body: Option<serde_json::Value>,
}

/// Wrapper so the world can stay `Debug`
pub struct SentinelSlot(pub Sentinel);

impl std::fmt::Debug for SentinelSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Sentinel")
    }
}

impl DowntimeWorld {
    fn config(&self) -> Config {
        let mut config = Config {
            tailscale: Some(TailscaleConfig {
                api_key: "tskey-bdd".to_string(),
                tailnet: "example.com".to_string(),
                ..TailscaleConfig::default()
            }),
            notifications: NotificationConfig {
                recipients: if self.recipients.is_empty() {
                    vec!["+10000000001".to_string()]
                } else {
                    self.recipients.clone()
                },
                ..NotificationConfig::default()
            },
            channel: ChannelConfig {
                access_token: "wa-bdd".to_string(),
                phone_number_id: "555".to_string(),
                ..ChannelConfig::default()
            },
            api: ApiConfig {
                key: Some(API_KEY.to_string()),
                ..ApiConfig::default()
            },
            ..Config::default()
        };
        if let Some(name) = &self.target_name {
            config.target.name = name.clone();
        }
        if self.threshold_minutes > 0 {
            config.schedule.alert_threshold_minutes = self.threshold_minutes;
        }
        if self.repeat_minutes > 0 {
            config.schedule.repeat_alert_interval_minutes = self.repeat_minutes;
        }
        config
    }

    /// Build the sentinel on first use with the scenario's fakes
    pub async fn sentinel(&mut self) -> &mut Sentinel {
        if self.sentinel.is_none() {
            let config = self.config();
            let provider = Arc::new(FakeProvider::new(config.target_name()));
            let channel = Arc::new(RecordingChannel::default());
            channel.set_ready(self.channel_ready.unwrap_or(true));
            let clock = Arc::new(ManualClock::new(epoch()));

            let sentinel = SentinelBuilder::new(config)
                .with_provider(provider.clone())
                .with_channel(channel.clone())
                .with_clock(clock.clone())
                .build()
                .await
                .expect("sentinel builds");

            self.provider = Some(provider);
            self.channel = Some(channel);
            self.clock = Some(clock);
            self.sentinel = Some(SentinelSlot(sentinel));
        }
        &mut self.sentinel.as_mut().expect("sentinel built above").0
    }

    pub fn channel(&self) -> &RecordingChannel {
        self.channel.as_ref().expect("sentinel not built")
    }
}
