//! Tiered prober
//!
//! Runs the configured chain of tiers against one descriptor:
//!
//! - `Gate` tiers must pass; the first failure ends the probe as dead.
//! - `Verify` tiers measure the proxy; the first success is classified on the
//!   sum of every tier time recorded so far.
//! - `Fallback` tiers run only after every verify tier failed; a success is
//!   classified on the fallback's own time.
//!
//! Every call is bounded by the tier's timeout and raced against the run's
//! cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, instrument};

use super::browser::BrowserTier;
use super::cancel::CancelToken;
use super::dns::DnsTier;
use super::echo::EchoTier;
use super::progress::Progress;
use super::tcp::TcpTier;
use super::tier::{duration_ms, ProbeTier, TierOutcome};
use crate::config::{Config, ProbeConfig};
use crate::error::ErrorKind;
use crate::models::{ProbeResult, ProbeStatus, ProxyDescriptor, TierTimings};
use crate::ranking::classify;

/// Position of a tier in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierRole {
    Gate,
    Verify,
    Fallback,
}

struct Stage {
    tier: Arc<dyn ProbeTier>,
    role: TierRole,
    timeout: Duration,
}

pub struct TieredProber {
    stages: Vec<Stage>,
    active_threshold_ms: u64,
    max_acceptable_ms: u64,
    progress: Progress,
}

/// Builder for [`TieredProber`]; stages run in the order they are added
pub struct TieredProberBuilder {
    config: ProbeConfig,
    stages: Vec<Stage>,
    progress: Progress,
}

impl TieredProberBuilder {
    fn stage(mut self, tier: Arc<dyn ProbeTier>, role: TierRole) -> Self {
        let timeout = self.config.timeout_for(tier.name());
        self.stages.push(Stage {
            tier,
            role,
            timeout,
        });
        self
    }

    pub fn gate(self, tier: Arc<dyn ProbeTier>) -> Self {
        self.stage(tier, TierRole::Gate)
    }

    pub fn verify(self, tier: Arc<dyn ProbeTier>) -> Self {
        self.stage(tier, TierRole::Verify)
    }

    pub fn fallback(self, tier: Arc<dyn ProbeTier>) -> Self {
        self.stage(tier, TierRole::Fallback)
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn build(self) -> TieredProber {
        TieredProber {
            stages: self.stages,
            active_threshold_ms: self.config.active_threshold_ms,
            max_acceptable_ms: self.config.max_acceptable_ms,
            progress: self.progress,
        }
    }
}

impl TieredProber {
    pub fn builder(config: &ProbeConfig) -> TieredProberBuilder {
        TieredProberBuilder {
            config: config.clone(),
            stages: Vec::new(),
            progress: Progress::silent(),
        }
    }

    /// Default chain: DNS and TCP gates, echo verification, optional browser fallback
    pub fn from_config(config: &Config, progress: Progress) -> Self {
        let mut builder = Self::builder(&config.probe)
            .gate(Arc::new(DnsTier))
            .gate(Arc::new(TcpTier))
            .verify(Arc::new(EchoTier::from_config(&config.echo)))
            .with_progress(progress);

        if config.browser.enabled {
            builder = builder.fallback(Arc::new(BrowserTier::from_config(&config.browser)));
        }
        builder.build()
    }

    pub fn tier_count(&self) -> usize {
        self.stages.len()
    }

    /// Probe one descriptor
    ///
    /// Returns `None` only when `cancel` fired before a verdict was reached.
    #[instrument(skip(self, cancel), fields(proxy = %descriptor))]
    pub async fn probe(
        &self,
        descriptor: &ProxyDescriptor,
        cancel: &CancelToken,
    ) -> Option<ProbeResult> {
        let mut timings = TierTimings::new();
        let mut last_failure: Option<TierOutcome> = None;

        for (position, stage) in self.stages.iter().enumerate() {
            if cancel.is_cancelled() {
                return None;
            }

            let name = stage.tier.name();
            let outcome = self.run_stage(stage, descriptor, cancel).await?;
            timings.record(name, outcome.time_ms);

            if outcome.success {
                debug!(tier = %name, time_ms = outcome.time_ms, "tier passed");
                self.progress
                    .emit(format!("{} {} ok ({}ms)", descriptor, name, outcome.time_ms));
                match stage.role {
                    TierRole::Gate => continue,
                    TierRole::Verify => {
                        let total = timings.total();
                        return Some(self.verdict(descriptor, total, timings, outcome.detail));
                    }
                    TierRole::Fallback => {
                        let total = outcome.time_ms;
                        return Some(self.verdict(descriptor, total, timings, outcome.detail));
                    }
                }
            }

            let kind = outcome.error_kind.unwrap_or(ErrorKind::Timeout);
            let message = outcome.error_message.clone().unwrap_or_default();
            debug!(tier = %name, kind = %kind, "tier failed: {}", message);

            if stage.role == TierRole::Gate {
                self.progress
                    .emit(format!("{} dead at {}: {}", descriptor, name, message));
                return Some(ProbeResult::dead(
                    descriptor.original.clone(),
                    Some(descriptor.clone()),
                    timings,
                    kind,
                    message,
                ));
            }

            let escalates = self.stages[position + 1..]
                .iter()
                .any(|s| s.role != TierRole::Gate);
            if escalates {
                self.progress
                    .emit(format!("{} {} failed, escalating: {}", descriptor, name, message));
            }
            last_failure = Some(outcome);
        }

        let (kind, message) = match last_failure {
            Some(outcome) => (
                outcome.error_kind.unwrap_or(ErrorKind::Timeout),
                outcome.error_message.unwrap_or_default(),
            ),
            None => (
                ErrorKind::HttpProbeExhausted,
                "no verification tier configured".to_string(),
            ),
        };
        self.progress
            .emit(format!("{} dead: {}", descriptor, message));
        Some(ProbeResult::dead(
            descriptor.original.clone(),
            Some(descriptor.clone()),
            timings,
            kind,
            message,
        ))
    }

    async fn run_stage(
        &self,
        stage: &Stage,
        descriptor: &ProxyDescriptor,
        cancel: &CancelToken,
    ) -> Option<TierOutcome> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = timeout(stage.timeout, stage.tier.probe(descriptor, stage.timeout)) => {
                Some(result.unwrap_or_else(|_| {
                    TierOutcome::failed(
                        duration_ms(stage.timeout),
                        ErrorKind::Timeout,
                        format!(
                            "{} tier timed out after {}ms",
                            stage.tier.name(),
                            stage.timeout.as_millis()
                        ),
                    )
                }))
            }
        }
    }

    fn verdict(
        &self,
        descriptor: &ProxyDescriptor,
        total: u64,
        timings: TierTimings,
        observed_ip: Option<String>,
    ) -> ProbeResult {
        let status = classify(total, self.active_threshold_ms, self.max_acceptable_ms);
        if status == ProbeStatus::Dead {
            self.progress.emit(format!(
                "{} dead: {}ms exceeds {}ms",
                descriptor, total, self.max_acceptable_ms
            ));
            return ProbeResult::dead(
                descriptor.original.clone(),
                Some(descriptor.clone()),
                timings,
                ErrorKind::Timeout,
                format!(
                    "response time {}ms exceeds max acceptable {}ms",
                    total, self.max_acceptable_ms
                ),
            );
        }

        self.progress
            .emit(format!("{} {} ({}ms)", descriptor, status, total));
        ProbeResult::usable(descriptor.clone(), status, total, timings, observed_ip)
    }
}
