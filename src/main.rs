//! Proxyrank - Entry Point
//!
//! Verifies a proxy list and prints the ranked report as JSON.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use proxyrank::config::LogConfig;
use proxyrank::models::parse_proxy_list;
use proxyrank::probe::{check_echo_services, Progress, TracingProgress};
use proxyrank::{CancelToken, Config, Pipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = Config::from_env().context("failed to load configuration")?;
    init_tracing(&config.log);

    info!("Starting proxyrank");

    let input = read_input(std::env::args().nth(1)).await?;
    let proxies = parse_proxy_list(&input);
    info!("Loaded {} proxies", proxies.len());

    let available = check_echo_services(
        &config.echo.services,
        Duration::from_millis(config.echo.request_timeout_ms),
    )
    .await;
    if available.is_empty() {
        warn!("No echo service reachable directly; keeping the configured list");
    } else {
        config.echo.services = available;
    }

    let pipeline = Pipeline::new(config, Progress::new(Arc::new(TracingProgress)))
        .context("invalid configuration")?;

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, cancelling run");
                trigger.cancel();
            }
            Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
        }
    });

    let report = pipeline.run(&proxies, &cancel).await;
    let sessions = pipeline.plan_sessions(&report.ranked);

    let output = serde_json::json!({
        "report": report,
        "sessions": sessions,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    info!("proxyrank finished");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("proxyrank={}", log.level).into());

    let json = log.format.eq_ignore_ascii_case("json");
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

/// Proxy list from a file path, or stdin when no path is given
async fn read_input(path: Option<String>) -> anyhow::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read proxy list {}", path)),
        None => {
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("failed to read proxy list from stdin")?;
            Ok(input)
        }
    }
}
