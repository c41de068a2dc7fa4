use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{ErrorKind, RankerError};
use crate::models::{ProxyDescriptor, TierName};

/// Timed outcome of a single verification tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierOutcome {
    pub success: bool,
    pub time_ms: u64,
    /// Diagnostic data, e.g. the address reported by an echo service
    pub detail: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
}

impl TierOutcome {
    pub fn passed(time_ms: u64, detail: Option<String>) -> Self {
        Self {
            success: true,
            time_ms,
            detail,
            error_kind: None,
            error_message: None,
        }
    }

    pub fn failed(time_ms: u64, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            time_ms,
            detail: None,
            error_kind: Some(kind),
            error_message: Some(message.into()),
        }
    }

    pub fn from_error(time_ms: u64, err: &RankerError) -> Self {
        Self::failed(time_ms, err.kind(), err.to_string())
    }
}

/// One verification stage
///
/// Implementations report failures through the outcome instead of
/// returning errors; the prober enforces `timeout` around every call, so a
/// tier only needs it to budget internal retries.
#[async_trait]
pub trait ProbeTier: Send + Sync {
    fn name(&self) -> TierName;

    async fn probe(&self, descriptor: &ProxyDescriptor, timeout: Duration) -> TierOutcome;
}

pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    duration_ms(start.elapsed())
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        let ok = TierOutcome::passed(20, Some("1.2.3.4".to_string()));
        assert!(ok.success);
        assert!(ok.error_kind.is_none());

        let failed = TierOutcome::failed(5000, ErrorKind::Timeout, "tcp timed out");
        assert!(!failed.success);
        assert_eq!(failed.error_kind, Some(ErrorKind::Timeout));

        let from_err = TierOutcome::from_error(3, &RankerError::DnsFailure("nx".to_string()));
        assert_eq!(from_err.error_kind, Some(ErrorKind::DnsFailure));
        assert_eq!(from_err.error_message.as_deref(), Some("DNS resolution failed: nx"));
    }

    #[test]
    fn test_duration_ms() {
        assert_eq!(duration_ms(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_ms(Duration::from_micros(999)), 0);
    }
}
