//! End-to-end verification run
//!
//! Wires configuration, the tiered prober, the scheduler and ranking into a
//! single call, and plans per-session proxy assignments from the ranked list.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::models::{ProbeResult, ProbeSummary, RankedEntry};
use crate::probe::{CancelToken, Progress, Scheduler, TieredProber};
use crate::ranking::filter_and_sort;
use crate::rotation::{session_delay, RotationSelector};

/// Everything produced by one verification run
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per input, in input order
    pub results: Vec<ProbeResult>,
    /// Usable proxies inside the configured latency band, fastest first
    pub ranked: Vec<RankedEntry>,
    pub summary: ProbeSummary,
    /// The caller cancelled the run before every proxy was probed
    pub cancelled: bool,
}

/// Proxy assignment for one orchestrator session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionPlan {
    pub session: usize,
    /// `None` means the session runs without a proxy
    pub proxy: Option<String>,
    pub response_time_ms: Option<u64>,
    /// Pause before the following session
    pub delay_ms: u64,
}

pub struct Pipeline {
    config: Config,
    scheduler: Scheduler,
    progress: Progress,
}

impl Pipeline {
    /// Build the default tier chain from `config`
    ///
    /// Fails with `InvalidConfig` before any probing happens.
    pub fn new(config: Config, progress: Progress) -> Result<Self> {
        let prober = TieredProber::from_config(&config, progress.clone());
        Self::with_prober(config, prober, progress)
    }

    /// Use a custom tier chain
    pub fn with_prober(config: Config, prober: TieredProber, progress: Progress) -> Result<Self> {
        config.validate()?;
        let scheduler = Scheduler::new(Arc::new(prober), config.scheduler.clone())
            .with_progress(progress.clone());

        Ok(Self {
            config,
            scheduler,
            progress,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(&self, raws: &[String], cancel: &CancelToken) -> VerificationReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let results = self
            .scheduler
            .run_all(raws, cancel)
            .instrument(info_span!("verification", run_id = %run_id))
            .await;
        let ranked = filter_and_sort(
            &results,
            self.config.ranking.min_ping_ms,
            self.config.ranking.max_ping_ms,
        );
        let summary = ProbeSummary::from_results(&results);

        self.progress.emit(format!("Proxy test complete: {}", summary));
        info!(
            run_id = %run_id,
            active = summary.active,
            slow = summary.slow,
            dead = summary.dead,
            ranked = ranked.len(),
            "Ranking complete"
        );

        VerificationReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            results,
            ranked,
            summary,
            cancelled: cancel.is_cancelled(),
        }
    }

    /// Assign a proxy to each configured session using the rotation policy
    pub fn plan_sessions(&self, ranked: &[RankedEntry]) -> Vec<SessionPlan> {
        let selector = RotationSelector::new(self.config.rotation.policy);
        selector.refresh(ranked.to_vec());
        let base_delay = Duration::from_millis(self.config.rotation.base_delay_ms);

        (0..self.config.rotation.sessions)
            .map(|session| {
                let entry = selector.next();
                let delay = session_delay(entry.as_deref(), base_delay);
                SessionPlan {
                    session,
                    proxy: entry.as_ref().map(|e| e.proxy.clone()),
                    response_time_ms: entry.as_ref().map(|e| e.response_time_ms),
                    delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;
    use crate::error::{ErrorKind, RankerError};
    use crate::models::{ProbeStatus, TierName};
    use crate::probe::prober::testing::FakeTier;
    use crate::probe::tier::TierOutcome;
    use crate::rotation::RotationPolicy;
    use parking_lot::Mutex;

    fn mixed_prober(config: &Config) -> TieredProber {
        TieredProber::builder(&config.probe)
            .gate(Arc::new(FakeTier::passing(TierName::Dns, 0)))
            .gate(Arc::new(FakeTier::passing(TierName::Tcp, 0)))
            .verify(Arc::new(FakeTier::new(TierName::Http, |d| match d.port {
                8001 => TierOutcome::passed(800, None),
                8002 => TierOutcome::passed(2500, None),
                _ => TierOutcome::failed(
                    40,
                    ErrorKind::HttpProbeExhausted,
                    "all echo services failed",
                ),
            })))
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ranks_usable_proxies() {
        let config = Config::default();
        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let captured = lines.clone();
        let progress = Progress::new(Arc::new(move |line: &str| {
            captured.lock().push(line.to_string());
        }));
        let pipeline =
            Pipeline::with_prober(config.clone(), mixed_prober(&config), progress).unwrap();

        let raws: Vec<String> = ["10.0.0.3:8003", "10.0.0.2:8002", "10.0.0.1:8001"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let report = pipeline.run(&raws, &CancelToken::new()).await;

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.results[0].status, ProbeStatus::Dead);
        assert_eq!(report.results[1].status, ProbeStatus::Slow);
        assert_eq!(report.results[2].status, ProbeStatus::Active);
        assert_eq!(
            report.ranked,
            vec![
                RankedEntry {
                    proxy: "10.0.0.1:8001".to_string(),
                    response_time_ms: 800
                },
                RankedEntry {
                    proxy: "10.0.0.2:8002".to_string(),
                    response_time_ms: 2500
                },
            ]
        );
        assert_eq!(report.summary.to_string(), "1 active, 1 slow, 1 dead");
        assert!(!report.cancelled);
        assert!(lines
            .lock()
            .iter()
            .any(|l| l.ends_with("Proxy test complete: 1 active, 1 slow, 1 dead")));
    }

    #[test]
    fn test_invalid_config_rejected_before_probing() {
        let mut config = Config::default();
        config.probe.active_threshold_ms = 9000;

        let err = Pipeline::new(config, Progress::silent()).err().unwrap();
        assert!(matches!(err, RankerError::InvalidConfig(_)));
    }

    #[test]
    fn test_plan_sessions_round_robin_with_delay() {
        let mut config = Config::default();
        config.rotation.sessions = 3;
        config.rotation.policy = RotationPolicy::RoundRobin;
        let pipeline = Pipeline::with_prober(
            config.clone(),
            TieredProber::builder(&ProbeConfig::default()).build(),
            Progress::silent(),
        )
        .unwrap();

        let ranked = vec![
            RankedEntry {
                proxy: "10.0.0.1:8001".to_string(),
                response_time_ms: 800,
            },
            RankedEntry {
                proxy: "10.0.0.2:8002".to_string(),
                response_time_ms: 2500,
            },
        ];
        let plan = pipeline.plan_sessions(&ranked);

        let proxies: Vec<Option<&str>> = plan.iter().map(|p| p.proxy.as_deref()).collect();
        assert_eq!(
            proxies,
            vec![Some("10.0.0.1:8001"), Some("10.0.0.2:8002"), Some("10.0.0.1:8001")]
        );
        assert_eq!(plan[0].delay_ms, 3000);
        assert_eq!(plan[1].delay_ms, 5000);
    }

    #[test]
    fn test_plan_sessions_without_proxies() {
        let mut config = Config::default();
        config.rotation.sessions = 2;
        let pipeline = Pipeline::with_prober(
            config,
            TieredProber::builder(&ProbeConfig::default()).build(),
            Progress::silent(),
        )
        .unwrap();

        let plan = pipeline.plan_sessions(&[]);
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|p| p.proxy.is_none() && p.delay_ms == 3000));
    }
}
