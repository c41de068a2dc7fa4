//! TCP connect tier

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

use super::tier::{elapsed_ms, ProbeTier, TierOutcome};
use crate::error::RankerError;
use crate::models::{ProxyDescriptor, TierName};

/// Opens and immediately drops a raw connection to the proxy
pub struct TcpTier;

#[async_trait]
impl ProbeTier for TcpTier {
    fn name(&self) -> TierName {
        TierName::Tcp
    }

    async fn probe(&self, descriptor: &ProxyDescriptor, _timeout: Duration) -> TierOutcome {
        let start = Instant::now();

        match TcpStream::connect((descriptor.host.as_str(), descriptor.port)).await {
            Ok(stream) => {
                let time_ms = elapsed_ms(start);
                drop(stream);
                debug!(proxy = %descriptor.authority(), time_ms, "TCP connect ok");
                TierOutcome::passed(time_ms, None)
            }
            Err(e) => TierOutcome::from_error(
                elapsed_ms(start),
                &RankerError::TcpConnectFailure(format!(
                    "connect to {} failed: {}",
                    descriptor.authority(),
                    e
                )),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_to_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let descriptor = ProxyDescriptor::parse(&format!("127.0.0.1:{}", port)).unwrap();
        let outcome = TcpTier.probe(&descriptor, Duration::from_secs(1)).await;
        assert!(outcome.success, "{:?}", outcome);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let descriptor = ProxyDescriptor::parse(&format!("127.0.0.1:{}", port)).unwrap();
        let outcome = TcpTier.probe(&descriptor, Duration::from_secs(1)).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::TcpConnectFailure));
        assert!(outcome
            .error_message
            .unwrap()
            .starts_with(&format!("TCP connect failed: connect to 127.0.0.1:{}", port)));
    }
}
