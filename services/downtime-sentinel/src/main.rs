//! Downtime Sentinel CLI
//!
//! Command-line interface for the reachability monitoring and alert service.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use downtime_sentinel::clock::elapsed_minutes;
use downtime_sentinel::io::ReqwestHttpClient;
use downtime_sentinel::provider::{build_provider, describe_record, find_target};
use downtime_sentinel::{load_config, Config, SentinelBuilder};
use tracing::Level;

#[derive(Parser)]
#[command(name = "downtime-sentinel")]
#[command(about = "Reachability monitoring with downtime alerts")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single check and exit
    #[arg(long)]
    check: bool,

    /// List every target the provider reports, with its verdict, and exit
    #[arg(long, conflicts_with = "check")]
    list_targets: bool,

    /// Control plane port (overrides config file and environment)
    #[arg(long)]
    api_port: Option<u16>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, check={}, list_targets={}, api_port={:?}, log_level={:?}",
        args.config,
        args.check,
        args.list_targets,
        args.api_port,
        args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    config.resolve_env()?;

    if let Some(api_port) = args.api_port {
        config.api.port = api_port;
    }

    if args.list_targets {
        list_targets(&config).await?;
        return Ok(());
    }

    tracing::info!("Starting downtime sentinel for '{}'", config.target_name());

    let mut sentinel = SentinelBuilder::new(config).build().await?;

    if args.check {
        tracing::info!("Running single check");
        match sentinel.check_once().await {
            Some(report) => {
                tracing::info!(
                    "Single check completed: {} is {} ({})",
                    report.status.name,
                    if report.status.online() { "ONLINE" } else { "OFFLINE" },
                    report.status.raw_state
                );
                return Ok(());
            }
            None => return Err("single check failed".into()),
        }
    }

    sentinel.start().await?;

    Ok(())
}

/// Print every target the provider knows about, marking the watched one
async fn list_targets(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let http = Arc::new(ReqwestHttpClient::with_timeout(Duration::from_secs(
        config.provider.request_timeout_seconds,
    ))?);
    let provider = build_provider(config, http)?;
    let records = provider.fetch_all_targets().await?;
    let now = Utc::now();

    println!(
        "=== {} TARGETS ({}) ===",
        provider.kind().to_string().to_uppercase(),
        records.len()
    );
    for record in &records {
        let status = record.evaluate(now);
        let seen = status
            .last_active_at
            .map(|at| format!("{} minutes ago", elapsed_minutes(at, now)))
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{}: {} [{}], last active {}",
            describe_record(record),
            if status.online() { "ONLINE" } else { "OFFLINE" },
            status.raw_state,
            seen
        );
    }

    let target = config.target_name();
    match find_target(records, target) {
        Ok(record) => println!(
            "Watched target '{}' resolves to {}",
            target,
            describe_record(&record)
        ),
        Err(e) => println!("Watched target '{}' does not resolve: {}", target, e),
    }

    Ok(())
}
