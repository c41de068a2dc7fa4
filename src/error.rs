use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure category attached to dead probe results and tier outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidFormat,
    DnsFailure,
    TcpConnectFailure,
    HttpProbeExhausted,
    BrowserProbeFailure,
    Timeout,
    InvalidConfiguration,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidFormat => "invalid_format",
            ErrorKind::DnsFailure => "dns_failure",
            ErrorKind::TcpConnectFailure => "tcp_connect_failure",
            ErrorKind::HttpProbeExhausted => "http_probe_exhausted",
            ErrorKind::BrowserProbeFailure => "browser_probe_failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidConfiguration => "invalid_configuration",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified error type for the proxyrank crate
#[derive(Error, Debug)]
pub enum RankerError {
    // Parse errors
    #[error("Invalid proxy format: {0}")]
    InvalidFormat(String),

    // Tier errors
    #[error("DNS resolution failed: {0}")]
    DnsFailure(String),

    #[error("TCP connect failed: {0}")]
    TcpConnectFailure(String),

    #[error("All echo services failed: {0}")]
    HttpProbeExhausted(String),

    #[error("Browser probe failed: {0}")]
    BrowserProbeFailure(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for proxyrank operations
pub type Result<T> = std::result::Result<T, RankerError>;

impl RankerError {
    /// Map this error onto the failure category recorded in probe results
    pub fn kind(&self) -> ErrorKind {
        match self {
            RankerError::InvalidFormat(_) => ErrorKind::InvalidFormat,
            RankerError::DnsFailure(_) => ErrorKind::DnsFailure,
            RankerError::TcpConnectFailure(_) => ErrorKind::TcpConnectFailure,
            RankerError::HttpProbeExhausted(_) | RankerError::Http(_) => {
                ErrorKind::HttpProbeExhausted
            }
            RankerError::BrowserProbeFailure(_) => ErrorKind::BrowserProbeFailure,
            RankerError::Timeout(_) => ErrorKind::Timeout,
            RankerError::InvalidConfig(_) => ErrorKind::InvalidConfiguration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            RankerError::InvalidFormat("bad".to_string()).kind(),
            ErrorKind::InvalidFormat
        );
        assert_eq!(
            RankerError::DnsFailure("nx".to_string()).kind(),
            ErrorKind::DnsFailure
        );
        assert_eq!(
            RankerError::Timeout("tcp".to_string()).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            RankerError::InvalidConfig("min > max".to_string()).kind(),
            ErrorKind::InvalidConfiguration
        );
        assert_eq!(
            RankerError::TcpConnectFailure("refused".to_string()).kind(),
            ErrorKind::TcpConnectFailure
        );
    }

    #[test]
    fn test_error_kind_as_str() {
        assert_eq!(ErrorKind::HttpProbeExhausted.as_str(), "http_probe_exhausted");
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
        assert_eq!(
            serde_json::to_string(&ErrorKind::TcpConnectFailure).unwrap(),
            "\"tcp_connect_failure\""
        );
    }
}
