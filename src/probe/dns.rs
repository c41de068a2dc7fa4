//! DNS resolution tier

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::lookup_host;
use tokio::time::Instant;
use tracing::debug;

use super::tier::{elapsed_ms, ProbeTier, TierOutcome};
use crate::error::RankerError;
use crate::models::{ProxyDescriptor, TierName};

/// Resolves the proxy host through the system resolver
///
/// IP literals pass without a lookup.
pub struct DnsTier;

#[async_trait]
impl ProbeTier for DnsTier {
    fn name(&self) -> TierName {
        TierName::Dns
    }

    async fn probe(&self, descriptor: &ProxyDescriptor, _timeout: Duration) -> TierOutcome {
        let start = Instant::now();

        if let Ok(ip) = descriptor.host.parse::<IpAddr>() {
            return TierOutcome::passed(elapsed_ms(start), Some(ip.to_string()));
        }

        match lookup_host((descriptor.host.as_str(), descriptor.port)).await {
            Ok(addrs) => {
                let mut ips: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
                ips.sort();
                ips.dedup();

                match ips.first() {
                    Some(ip) => {
                        debug!(host = %descriptor.host, resolved = ips.len(), "DNS lookup ok");
                        TierOutcome::passed(elapsed_ms(start), Some(ip.to_string()))
                    }
                    None => TierOutcome::from_error(
                        elapsed_ms(start),
                        &RankerError::DnsFailure(format!(
                            "{} resolved to no addresses",
                            descriptor.host
                        )),
                    ),
                }
            }
            Err(e) => TierOutcome::from_error(
                elapsed_ms(start),
                &RankerError::DnsFailure(format!("lookup of {} failed: {}", descriptor.host, e)),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_ip_literal_passes_without_lookup() {
        let descriptor = ProxyDescriptor::parse("203.0.113.5:8080").unwrap();
        let outcome = DnsTier.probe(&descriptor, Duration::from_secs(1)).await;
        assert!(outcome.success);
        assert_eq!(outcome.detail.as_deref(), Some("203.0.113.5"));
    }

    #[tokio::test]
    async fn test_localhost_resolves() {
        let descriptor = ProxyDescriptor::parse("localhost:8080").unwrap();
        let outcome = DnsTier.probe(&descriptor, Duration::from_secs(5)).await;
        assert!(outcome.success, "{:?}", outcome);
    }

    #[tokio::test]
    async fn test_reserved_tld_fails() {
        let descriptor = ProxyDescriptor::parse("no-such-host.invalid:8080").unwrap();
        let outcome = DnsTier.probe(&descriptor, Duration::from_secs(5)).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::DnsFailure));
        let message = outcome.error_message.unwrap();
        assert!(message.starts_with("DNS resolution failed: "));
        assert!(message.contains("no-such-host.invalid"));
    }
}
