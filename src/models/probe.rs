use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use super::ProxyDescriptor;
use crate::error::{ErrorKind, RankerError};

/// Response time recorded for dead proxies
pub const DEAD_SENTINEL_MS: u64 = 9999;

/// Verdict for a probed proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Active,
    Slow,
    Dead,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Active => "active",
            ProbeStatus::Slow => "slow",
            ProbeStatus::Dead => "dead",
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, ProbeStatus::Active | ProbeStatus::Slow)
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verification stage identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierName {
    Dns,
    Tcp,
    Http,
    Browser,
}

impl TierName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierName::Dns => "dns",
            TierName::Tcp => "tcp",
            TierName::Http => "http",
            TierName::Browser => "browser",
        }
    }
}

impl std::fmt::Display for TierName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-tier timings in the order the tiers ran
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierTimings(Vec<(TierName, u64)>);

impl TierTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tier: TierName, time_ms: u64) {
        self.0.push((tier, time_ms));
    }

    pub fn get(&self, tier: TierName) -> Option<u64> {
        self.0.iter().find(|(name, _)| *name == tier).map(|(_, ms)| *ms)
    }

    pub fn total(&self) -> u64 {
        self.0.iter().map(|(_, ms)| ms).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(TierName, u64)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Serialized as a JSON object keyed by tier name, keeping run order.
impl Serialize for TierTimings {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (tier, ms) in &self.0 {
            map.serialize_entry(tier.as_str(), ms)?;
        }
        map.end()
    }
}

/// Outcome of verifying one proxy during one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    /// Raw input string
    pub proxy: String,
    /// Parsed endpoint, absent when the input failed to parse
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<ProxyDescriptor>,
    pub status: ProbeStatus,
    pub total_time_ms: u64,
    pub tier_timings: TierTimings,
    /// Address reported by the echo service, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProbeResult {
    /// Result for a proxy whose measurement classified as active or slow
    pub fn usable(
        descriptor: ProxyDescriptor,
        status: ProbeStatus,
        total_time_ms: u64,
        tier_timings: TierTimings,
        observed_ip: Option<String>,
    ) -> Self {
        debug_assert!(status.is_usable());
        Self {
            proxy: descriptor.original.clone(),
            descriptor: Some(descriptor),
            status,
            total_time_ms,
            tier_timings,
            observed_ip,
            error_kind: None,
            error_message: None,
        }
    }

    /// Dead result carrying the terminal error
    pub fn dead(
        proxy: impl Into<String>,
        descriptor: Option<ProxyDescriptor>,
        tier_timings: TierTimings,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            proxy: proxy.into(),
            descriptor,
            status: ProbeStatus::Dead,
            total_time_ms: DEAD_SENTINEL_MS,
            tier_timings,
            observed_ip: None,
            error_kind: Some(kind),
            error_message: Some(message.into()),
        }
    }

    /// Dead result for input that never became a descriptor
    pub fn unparsed(raw: &str, err: &RankerError) -> Self {
        Self::dead(raw, None, TierTimings::new(), err.kind(), err.to_string())
    }

    pub fn is_usable(&self) -> bool {
        self.status.is_usable()
    }
}

/// Ranked, usable proxy as handed to the session orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub proxy: String,
    pub response_time_ms: u64,
}

/// Aggregate verdict counts for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSummary {
    pub active: usize,
    pub slow: usize,
    pub dead: usize,
}

impl ProbeSummary {
    pub fn from_results(results: &[ProbeResult]) -> Self {
        results.iter().fold(Self::default(), |mut summary, result| {
            match result.status {
                ProbeStatus::Active => summary.active += 1,
                ProbeStatus::Slow => summary.slow += 1,
                ProbeStatus::Dead => summary.dead += 1,
            }
            summary
        })
    }

    pub fn total(&self) -> usize {
        self.active + self.slow + self.dead
    }
}

impl std::fmt::Display for ProbeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} active, {} slow, {} dead",
            self.active, self.slow, self.dead
        )
    }
}
