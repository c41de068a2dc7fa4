use crate::error::{Result, RankerError};
use crate::models::TierName;
use crate::rotation::RotationPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Echo services tried, in order, by the HTTP tier
pub const DEFAULT_ECHO_SERVICES: &[&str] = &[
    "https://httpbin.org/ip",
    "https://api.ipify.org?format=json",
    "https://jsonip.com",
    "https://api.myip.com",
    "https://ipinfo.io/json",
];

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Classification thresholds and per-tier timeouts
    pub probe: ProbeConfig,
    /// Dispatch policy and deadline
    pub scheduler: SchedulerConfig,
    /// Latency band for the ranked list
    pub ranking: RankingConfig,
    /// Session rotation policy
    pub rotation: RotationConfig,
    /// Echo services used by the HTTP tier
    pub echo: EchoConfig,
    /// Browser fallback tier
    pub browser: BrowserConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Below this total a proxy is active (default: 2000)
    pub active_threshold_ms: u64,
    /// Above this total a proxy is dead (default: 5000)
    pub max_acceptable_ms: u64,
    pub dns_timeout_ms: u64,
    pub tcp_timeout_ms: u64,
    /// Budget for the whole HTTP tier across all echo services
    pub http_timeout_ms: u64,
    pub browser_timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            active_threshold_ms: 2000,
            max_acceptable_ms: 5000,
            dns_timeout_ms: 5000,
            tcp_timeout_ms: 5000,
            http_timeout_ms: 10000,
            browser_timeout_ms: 15000,
        }
    }
}

impl ProbeConfig {
    /// Per-call timeout for a tier
    pub fn timeout_for(&self, tier: TierName) -> Duration {
        let ms = match tier {
            TierName::Dns => self.dns_timeout_ms,
            TierName::Tcp => self.tcp_timeout_ms,
            TierName::Http => self.http_timeout_ms,
            TierName::Browser => self.browser_timeout_ms,
        };
        Duration::from_millis(ms)
    }
}

/// How probes are dispatched over the candidate list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchPolicy {
    /// One probe at a time with a fixed delay between probes
    #[default]
    SequentialStaggered,
    /// Probe `i` starts at `i × interval`, bounded by a concurrency limit
    BoundedConcurrentStaggered,
}

impl DispatchPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sequential" | "sequential_staggered" | "sequential-staggered" => {
                Some(Self::SequentialStaggered)
            }
            "concurrent"
            | "bounded_concurrent"
            | "bounded-concurrent"
            | "bounded_concurrent_staggered"
            | "bounded-concurrent-staggered" => Some(Self::BoundedConcurrentStaggered),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SequentialStaggered => "sequential_staggered",
            Self::BoundedConcurrentStaggered => "bounded_concurrent_staggered",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub dispatch_policy: DispatchPolicy,
    /// Delay between probes, or per-index start offset (default: 500)
    pub stagger_interval_ms: u64,
    /// Maximum probes in flight for the concurrent policy (default: 8)
    pub max_concurrency: usize,
    /// Global deadline for one run (default: 300000)
    pub deadline_ms: u64,
    /// Extra time granted to in-flight probes after the deadline (default: 2000)
    pub grace_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            dispatch_policy: DispatchPolicy::SequentialStaggered,
            stagger_interval_ms: 500,
            max_concurrency: 8,
            deadline_ms: 300_000,
            grace_ms: 2000,
        }
    }
}

impl SchedulerConfig {
    pub fn stagger_interval(&self) -> Duration {
        Duration::from_millis(self.stagger_interval_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

#[derive(Debug, Clone)]
pub struct RankingConfig {
    pub min_ping_ms: u64,
    pub max_ping_ms: u64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            min_ping_ms: 100,
            max_ping_ms: 5000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RotationConfig {
    pub policy: RotationPolicy,
    /// Number of sessions the orchestrator will request
    pub sessions: usize,
    /// Minimum pause between sessions
    pub base_delay_ms: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            policy: RotationPolicy::RoundRobin,
            sessions: 1,
            base_delay_ms: 3000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EchoConfig {
    /// Ordered echo service URLs
    pub services: Vec<String>,
    /// Timeout for a single echo service request
    pub request_timeout_ms: u64,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            services: DEFAULT_ECHO_SERVICES.iter().map(|s| s.to_string()).collect(),
            request_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run the browser fallback when every echo service fails
    pub enabled: bool,
    /// Chromium-compatible executable
    pub binary: String,
    /// Echo endpoint the browser navigates to
    pub echo_url: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: "chromium".to_string(),
            echo_url: "https://httpbin.org/ip".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let dispatch_raw = get_env_or("PROBE_DISPATCH_POLICY", "sequential");
        let dispatch_policy = DispatchPolicy::from_str(&dispatch_raw).ok_or_else(|| {
            RankerError::InvalidConfig(format!(
                "PROBE_DISPATCH_POLICY has unsupported value: {}",
                dispatch_raw
            ))
        })?;

        let top_k = parse_env("ROTATION_TOP_K", 3usize)?;
        let policy = RotationPolicy::from_str(&get_env_or("ROTATION_POLICY", "round_robin"))
            .with_top_k(top_k);

        let services = get_env_or("PROBE_ECHO_SERVICES", "")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        let config = Config {
            probe: ProbeConfig {
                active_threshold_ms: parse_env(
                    "PROBE_ACTIVE_THRESHOLD_MS",
                    defaults.probe.active_threshold_ms,
                )?,
                max_acceptable_ms: parse_env(
                    "PROBE_MAX_ACCEPTABLE_MS",
                    defaults.probe.max_acceptable_ms,
                )?,
                dns_timeout_ms: parse_env("PROBE_DNS_TIMEOUT_MS", defaults.probe.dns_timeout_ms)?,
                tcp_timeout_ms: parse_env("PROBE_TCP_TIMEOUT_MS", defaults.probe.tcp_timeout_ms)?,
                http_timeout_ms: parse_env(
                    "PROBE_HTTP_TIMEOUT_MS",
                    defaults.probe.http_timeout_ms,
                )?,
                browser_timeout_ms: parse_env(
                    "PROBE_BROWSER_TIMEOUT_MS",
                    defaults.probe.browser_timeout_ms,
                )?,
            },
            scheduler: SchedulerConfig {
                dispatch_policy,
                stagger_interval_ms: parse_env(
                    "PROBE_STAGGER_INTERVAL_MS",
                    defaults.scheduler.stagger_interval_ms,
                )?,
                max_concurrency: parse_env(
                    "PROBE_MAX_CONCURRENCY",
                    defaults.scheduler.max_concurrency,
                )?,
                deadline_ms: parse_env("PROBE_DEADLINE_MS", defaults.scheduler.deadline_ms)?,
                grace_ms: parse_env("PROBE_DEADLINE_GRACE_MS", defaults.scheduler.grace_ms)?,
            },
            ranking: RankingConfig {
                min_ping_ms: parse_env("PROBE_MIN_PING_MS", defaults.ranking.min_ping_ms)?,
                max_ping_ms: parse_env("PROBE_MAX_PING_MS", defaults.ranking.max_ping_ms)?,
            },
            rotation: RotationConfig {
                policy,
                sessions: parse_env("ROTATION_SESSIONS", defaults.rotation.sessions)?,
                base_delay_ms: parse_env(
                    "SESSION_BASE_DELAY_MS",
                    defaults.rotation.base_delay_ms,
                )?,
            },
            echo: EchoConfig {
                services: if services.is_empty() {
                    defaults.echo.services
                } else {
                    services
                },
                request_timeout_ms: parse_env(
                    "PROBE_ECHO_REQUEST_TIMEOUT_MS",
                    defaults.echo.request_timeout_ms,
                )?,
            },
            browser: BrowserConfig {
                enabled: parse_env("PROBE_BROWSER_ENABLED", defaults.browser.enabled)?,
                binary: get_env_or("PROBE_BROWSER_BINARY", &defaults.browser.binary),
                echo_url: get_env_or("PROBE_BROWSER_ECHO_URL", &defaults.browser.echo_url),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", &defaults.log.level),
                format: get_env_or("LOG_FORMAT", &defaults.log.format),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        let probe = &self.probe;
        if probe.active_threshold_ms == 0 {
            return Err(invalid("active threshold must be positive"));
        }
        if probe.active_threshold_ms > probe.max_acceptable_ms {
            return Err(invalid(format!(
                "active threshold ({}ms) exceeds max acceptable ({}ms)",
                probe.active_threshold_ms, probe.max_acceptable_ms
            )));
        }
        for tier in [TierName::Dns, TierName::Tcp, TierName::Http, TierName::Browser] {
            if probe.timeout_for(tier).is_zero() {
                return Err(invalid(format!("{} timeout must be positive", tier)));
            }
        }

        if self.ranking.min_ping_ms > self.ranking.max_ping_ms {
            return Err(invalid(format!(
                "min ping ({}ms) exceeds max ping ({}ms)",
                self.ranking.min_ping_ms, self.ranking.max_ping_ms
            )));
        }

        if self.scheduler.max_concurrency == 0 {
            return Err(invalid("max concurrency must be at least 1"));
        }
        if self.scheduler.deadline_ms == 0 {
            return Err(invalid("deadline must be positive"));
        }

        if let RotationPolicy::TopKRandom { k: 0 } = self.rotation.policy {
            return Err(invalid("top-k must be at least 1"));
        }

        if self.echo.services.is_empty() {
            return Err(invalid("at least one echo service is required"));
        }
        if self.echo.request_timeout_ms == 0 {
            return Err(invalid("echo request timeout must be positive"));
        }
        for service in self.echo.services.iter().chain([&self.browser.echo_url]) {
            let url = Url::parse(service).map_err(|e| {
                invalid(format!("echo service {} is not a valid URL: {}", service, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(invalid(format!("echo service {} must use http(s)", service)));
            }
        }

        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> RankerError {
    RankerError::InvalidConfig(msg.into())
}

/// Parse an environment variable, falling back to `default` when unset
fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            RankerError::InvalidConfig(format!("{} has invalid value: {}", key, raw))
        }),
        _ => Ok(default),
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
