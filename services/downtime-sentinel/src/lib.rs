//! Downtime Sentinel - reachability monitoring with downtime alerts
//!
//! Watches one target through a reachability provider (Tailscale devices or
//! Cloudflare tunnels), debounces noisy provider states, and sends downtime,
//! repeat and recovery messages to a list of recipients.

pub mod api;
pub mod channel;
pub mod clock;
pub mod config;
pub mod detector;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod heuristic;
pub mod io;
pub mod provider;
pub mod schedule;
pub mod state;
pub mod template;

pub use config::{load_config, Config};
pub use error::{Result, SentinelError};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::ApiState;
use crate::channel::{MessageChannel, ReconnectPolicy, SessionKeeper, WhatsAppChannel};
use crate::clock::{Clock, SystemClock};
use crate::detector::{AlertPolicy, AlertStateMachine, TickReport};
use crate::dispatcher::NotificationDispatcher;
use crate::engine::Engine;
use crate::io::{HttpClient, ReqwestHttpClient};
use crate::provider::ReachabilityProvider;
use crate::schedule::Schedule;
use crate::state::StateHandle;

/// Builder for a [`Sentinel`]; every collaborator can be replaced for tests
pub struct SentinelBuilder {
    config: Config,
    http: Option<Arc<dyn HttpClient>>,
    provider: Option<Arc<dyn ReachabilityProvider>>,
    channel: Option<Arc<dyn MessageChannel>>,
    clock: Option<Arc<dyn Clock>>,
    cancel: Option<CancellationToken>,
}

impl SentinelBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http: None,
            provider: None,
            channel: None,
            clock: None,
            cancel: None,
        }
    }

    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn ReachabilityProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_channel(mut self, channel: Arc<dyn MessageChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Validate the configuration and wire everything together
    pub async fn build(self) -> Result<Sentinel> {
        let kind = self.config.validate()?;
        let schedule = Schedule::from_config(&self.config.schedule)?;

        let http: Arc<dyn HttpClient> = match self.http {
            Some(http) => http,
            None => Arc::new(ReqwestHttpClient::with_timeout(Duration::from_secs(
                self.config.provider.request_timeout_seconds,
            ))?),
        };
        let provider: Arc<dyn ReachabilityProvider> = match self.provider {
            Some(provider) => provider,
            None => provider::build_provider(&self.config, Arc::clone(&http))?,
        };
        let channel: Arc<dyn MessageChannel> = match self.channel {
            Some(channel) => channel,
            None => Arc::new(WhatsAppChannel::new(&self.config.channel, Arc::clone(&http))),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let cancel = self.cancel.unwrap_or_default();

        let target_name = self.config.target_name().to_string();
        let machine = AlertStateMachine::new(
            target_name,
            self.config.notifications.recipients.clone(),
            AlertPolicy::from_config(&self.config),
            clock.now(),
        )
        .with_target_label(kind.target_label());

        let state = state::new_state_handle(
            kind,
            machine.snapshot(),
            self.config.notifications.history_size,
        );
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::clone(&channel),
            &self.config.notifications,
            Arc::clone(&clock),
            Arc::clone(&state),
        ));

        tracing::debug!(
            "Built sentinel for '{}' via {}, {} recipients",
            machine.target_name(),
            kind,
            self.config.notifications.recipients.len()
        );

        let engine = Engine::new(
            machine,
            provider,
            Arc::clone(&dispatcher),
            Arc::clone(&clock),
            schedule,
            Arc::clone(&state),
            cancel.clone(),
        );

        Ok(Sentinel {
            config: self.config,
            engine,
            channel,
            dispatcher,
            clock,
            state,
            cancel,
        })
    }
}

/// A fully wired monitoring service
pub struct Sentinel {
    config: Config,
    engine: Engine,
    channel: Arc<dyn MessageChannel>,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    state: StateHandle,
    cancel: CancellationToken,
}

impl Sentinel {
    pub fn state(&self) -> StateHandle {
        Arc::clone(&self.state)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run a single check without connecting the channel or serving the API
    pub async fn check_once(&mut self) -> Option<TickReport> {
        self.engine.tick().await
    }

    /// Connect the channel, serve the control plane and monitor until cancelled
    pub async fn start(mut self) -> Result<()> {
        let cancel_for_signal = self.cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                    cancel_for_signal.cancel();
                }
                Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
            }
        });

        self.spawn_channel();

        if self.config.api.enabled {
            self.spawn_api();
        }

        tracing::info!(
            "Check schedule: {}, alert threshold: {} minutes, repeat every {} minutes",
            self.config
                .schedule
                .cron_expression
                .clone()
                .unwrap_or_else(|| format!(
                    "every {} minutes",
                    self.config.schedule.check_interval_minutes
                )),
            self.config.schedule.alert_threshold_minutes,
            self.config.schedule.repeat_alert_interval_minutes
        );

        self.engine.run().await;
        tracing::info!("Sentinel stopped");

        Ok(())
    }

    fn spawn_channel(&self) {
        let keeper = SessionKeeper::new(
            Arc::clone(&self.channel),
            ReconnectPolicy::from_config(&self.config.channel),
            self.cancel.clone(),
        );
        let greeting = self
            .config
            .channel
            .startup_recipient
            .clone()
            .zip(self.config.channel.startup_message.clone());

        tokio::spawn(keeper.run(greeting));
    }

    /// The control plane router, sharing this sentinel's state and channel
    pub fn control_plane(&self) -> axum::Router {
        api::build_router(ApiState {
            state: Arc::clone(&self.state),
            dispatcher: Arc::clone(&self.dispatcher),
            clock: Arc::clone(&self.clock),
            api_key: self.config.api.key.clone(),
        })
    }

    fn spawn_api(&self) {
        let port = self.config.api.port;
        let router = self.control_plane();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!(
                        "Failed to bind control plane to port {}: {}. Continuing without it.",
                        port,
                        e
                    );
                    return;
                }
            };
            tracing::info!("Control plane listening on http://{}", addr);

            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    cancel.cancelled().await;
                })
                .await
                .ok();

            tracing::debug!("Control plane stopped");
        });
    }
}
