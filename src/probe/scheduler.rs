//! Probe scheduling
//!
//! Runs the tiered prober over a candidate list, either one proxy at a time
//! with a fixed delay in between, or with staggered start offsets under a
//! concurrency limit. Results always come back in input order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep, sleep_until, timeout_at, Instant};
use tracing::{info, warn};

use super::cancel::CancelToken;
use super::progress::Progress;
use super::prober::TieredProber;
use crate::config::{DispatchPolicy, SchedulerConfig};
use crate::error::ErrorKind;
use crate::models::{ProbeResult, ProxyDescriptor, TierTimings};

const DEADLINE_MESSAGE: &str = "global deadline exceeded";

pub struct Scheduler {
    prober: Arc<TieredProber>,
    config: SchedulerConfig,
    progress: Progress,
}

/// Per-run bookkeeping shared by both dispatch policies
struct Run {
    total: usize,
    deadline: Instant,
    hard_stop: Instant,
}

impl Scheduler {
    pub fn new(prober: Arc<TieredProber>, config: SchedulerConfig) -> Self {
        Self {
            prober,
            config,
            progress: Progress::silent(),
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Probe every raw entry and return one result per entry, in input order
    ///
    /// Unparseable entries are recorded dead without probing. Entries not
    /// finished by the deadline are recorded dead with a timeout; entries not
    /// finished because `cancel` fired are omitted.
    pub async fn run_all(&self, raws: &[String], cancel: &CancelToken) -> Vec<ProbeResult> {
        let start = Instant::now();
        let deadline = start + self.config.deadline();
        let run = Run {
            total: raws.len(),
            deadline,
            hard_stop: deadline + self.config.grace(),
        };

        info!(
            proxies = raws.len(),
            policy = self.config.dispatch_policy.as_str(),
            "Starting verification run"
        );

        let mut slots: Vec<Option<ProbeResult>> = vec![None; raws.len()];
        let mut pending = Vec::new();
        for (index, raw) in raws.iter().enumerate() {
            match ProxyDescriptor::parse(raw) {
                Ok(descriptor) => pending.push((index, descriptor)),
                Err(e) => {
                    warn!(input = %raw, "Skipping invalid proxy: {}", e);
                    slots[index] = Some(ProbeResult::unparsed(raw, &e));
                }
            }
        }

        match self.config.dispatch_policy {
            DispatchPolicy::SequentialStaggered => {
                self.run_sequential(&run, pending.clone(), cancel, &mut slots)
                    .await
            }
            DispatchPolicy::BoundedConcurrentStaggered => {
                self.run_concurrent(&run, pending.clone(), cancel, &mut slots)
                    .await
            }
        }

        let cancelled = cancel.is_cancelled();
        let mut unfinished = 0usize;
        for (index, descriptor) in pending {
            if slots[index].is_some() {
                continue;
            }
            unfinished += 1;
            if !cancelled {
                slots[index] = Some(ProbeResult::dead(
                    descriptor.original.clone(),
                    Some(descriptor),
                    TierTimings::new(),
                    ErrorKind::Timeout,
                    DEADLINE_MESSAGE,
                ));
            }
        }

        if unfinished > 0 {
            if cancelled {
                warn!(unfinished, "Run cancelled, unfinished proxies omitted");
            } else {
                warn!(unfinished, "Deadline reached, unfinished proxies marked dead");
            }
        }

        let results: Vec<ProbeResult> = slots.into_iter().flatten().collect();
        info!(
            results = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Verification run finished"
        );
        results
    }

    async fn run_sequential(
        &self,
        run: &Run,
        pending: Vec<(usize, ProxyDescriptor)>,
        cancel: &CancelToken,
        slots: &mut [Option<ProbeResult>],
    ) {
        let interval = self.config.stagger_interval();

        for (order, (index, descriptor)) in pending.into_iter().enumerate() {
            if cancel.is_cancelled() || Instant::now() >= run.deadline {
                break;
            }
            if order > 0 && !interval.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = sleep_until(run.deadline) => break,
                    _ = sleep(interval) => {}
                }
            }

            self.progress.emit(format!(
                "Testing {}/{}: {}",
                index + 1,
                run.total,
                descriptor
            ));
            if let Ok(Some(result)) =
                timeout_at(run.deadline, self.prober.probe(&descriptor, cancel)).await
            {
                slots[index] = Some(result);
            }
        }
    }

    async fn run_concurrent(
        &self,
        run: &Run,
        pending: Vec<(usize, ProxyDescriptor)>,
        cancel: &CancelToken,
        slots: &mut [Option<ProbeResult>],
    ) {
        let interval = self.config.stagger_interval();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let start = Instant::now();
        let mut tasks = JoinSet::new();

        for (index, descriptor) in pending {
            let prober = self.prober.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let progress = self.progress.clone();
            let deadline = run.deadline;
            let total = run.total;
            let offset = stagger_offset(interval, index);

            tasks.spawn(async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return (index, None),
                    _ = sleep_until(deadline) => return (index, None),
                    _ = sleep_until(start + offset) => {}
                }

                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return (index, None),
                    _ = sleep_until(deadline) => return (index, None),
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return (index, None),
                    },
                };

                progress.emit(format!("Testing {}/{}: {}", index + 1, total, descriptor));
                let result = timeout_at(deadline, prober.probe(&descriptor, &cancel))
                    .await
                    .ok()
                    .flatten();
                (index, result)
            });
        }

        loop {
            match timeout_at(run.hard_stop, tasks.join_next()).await {
                Ok(Some(Ok((index, result)))) => {
                    if result.is_some() {
                        slots[index] = result;
                    }
                }
                Ok(Some(Err(e))) => warn!("Probe task failed: {}", e),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        remaining = tasks.len(),
                        "Abandoning probes still running after the grace period"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }
    }
}

/// Start offset of the probe for input position `index`
///
/// Invalid entries keep their slot, so offsets follow input positions rather
/// than the number of probes dispatched so far.
fn stagger_offset(interval: Duration, index: usize) -> Duration {
    interval.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX))
}
