//! HTTP echo-service tier
//!
//! Requests an IP-echo service through the candidate proxy. Services are
//! tried in order and the first usable answer wins.

use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use reqwest::Client;
use serde_json::Value;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use super::tier::{elapsed_ms, ProbeTier, TierOutcome};
use crate::config::EchoConfig;
use crate::error::{RankerError, Result};
use crate::models::{ProxyDescriptor, TierName};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Echo-service tier
pub struct EchoTier {
    services: Vec<String>,
    request_timeout: Duration,
}

impl EchoTier {
    pub fn new(services: Vec<String>, request_timeout: Duration) -> Self {
        Self {
            services,
            request_timeout,
        }
    }

    pub fn from_config(config: &EchoConfig) -> Self {
        Self::new(
            config.services.clone(),
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    fn client_for(descriptor: &ProxyDescriptor) -> Result<Client> {
        let proxy = reqwest::Proxy::all(descriptor.url())?;
        Ok(Client::builder()
            .proxy(proxy)
            .user_agent(USER_AGENT)
            .build()?)
    }
}

/// Fetch one echo service and pull the reported address out of its JSON body
async fn query(client: &Client, service: &str) -> Result<Option<String>> {
    let response = client.get(service).send().await?.error_for_status()?;
    let body: Value = response.json().await?;
    Ok(extract_ip(&body))
}

/// Reported address from an echo payload (`ip` or `origin` key)
pub fn extract_ip(body: &Value) -> Option<String> {
    ["ip", "origin"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

#[async_trait]
impl ProbeTier for EchoTier {
    fn name(&self) -> TierName {
        TierName::Http
    }

    async fn probe(&self, descriptor: &ProxyDescriptor, budget: Duration) -> TierOutcome {
        let start = Instant::now();

        let client = match Self::client_for(descriptor) {
            Ok(client) => client,
            Err(e) => {
                return TierOutcome::from_error(
                    elapsed_ms(start),
                    &RankerError::HttpProbeExhausted(format!(
                        "could not build client for {}: {}",
                        descriptor, e
                    )),
                )
            }
        };

        let mut last_error = String::from("no echo services configured");
        for service in &self.services {
            let remaining = budget.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                last_error = format!("tier budget spent before {}", service);
                break;
            }

            match timeout(remaining.min(self.request_timeout), query(&client, service)).await {
                Ok(Ok(ip)) => {
                    debug!(
                        proxy = %descriptor,
                        service = %service,
                        ip = ?ip,
                        "echo service answered"
                    );
                    return TierOutcome::passed(elapsed_ms(start), ip);
                }
                Ok(Err(e)) => {
                    debug!(
                        proxy = %descriptor,
                        service = %service,
                        error = %e,
                        "echo service failed"
                    );
                    last_error = format!("{}: {}", service, e);
                }
                Err(_) => {
                    debug!(proxy = %descriptor, service = %service, "echo service timed out");
                    last_error = format!("{}: timed out", service);
                }
            }
        }

        TierOutcome::from_error(
            elapsed_ms(start),
            &RankerError::HttpProbeExhausted(format!("last error: {}", last_error)),
        )
    }
}

/// Echo services reachable without a proxy, in configured order
///
/// Run before a verification round so an outage of the echo services
/// themselves is not mistaken for dead proxies.
pub async fn check_echo_services(services: &[String], request_timeout: Duration) -> Vec<String> {
    let client = match Client::builder().no_proxy().user_agent(USER_AGENT).build() {
        Ok(client) => client,
        Err(e) => {
            warn!("Failed to build echo check client: {}", e);
            return Vec::new();
        }
    };

    let checks = stream::iter(services)
        .map(|service| {
            let client = &client;
            async move {
                match timeout(request_timeout, client.get(service.as_str()).send()).await {
                    Ok(Ok(response)) if response.status().is_success() => {
                        info!("Echo service available: {}", service);
                        Some(service.clone())
                    }
                    Ok(Ok(response)) => {
                        warn!("Echo service {} returned {}", service, response.status());
                        None
                    }
                    Ok(Err(e)) => {
                        warn!("Echo service {} unavailable: {}", service, e);
                        None
                    }
                    Err(_) => {
                        warn!("Echo service {} timed out", service);
                        None
                    }
                }
            }
        })
        .buffered(services.len().max(1))
        .collect::<Vec<_>>()
        .await;

    checks.into_iter().flatten().collect()
}
