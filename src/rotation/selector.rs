//! Stateful rotation selector held by the session orchestrator

use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{pick_index, RotationPolicy};
use crate::models::RankedEntry;

/// Hands out ranked proxies per session
///
/// The policy can be swapped at runtime; the session counter uses atomic
/// operations for lock-free index tracking.
pub struct RotationSelector {
    entries: RwLock<Vec<Arc<RankedEntry>>>,
    policy: RwLock<RotationPolicy>,
    session: AtomicUsize,
}

impl RotationSelector {
    pub fn new(policy: RotationPolicy) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            policy: RwLock::new(policy),
            session: AtomicUsize::new(0),
        }
    }

    /// Pick the proxy for an explicit session index
    pub fn select(&self, session_index: usize) -> Option<Arc<RankedEntry>> {
        let entries = self.entries.read();
        let policy = *self.policy.read();
        pick_index(entries.len(), session_index, policy).and_then(|idx| entries.get(idx).cloned())
    }

    /// Pick the proxy for the next session
    pub fn next(&self) -> Option<Arc<RankedEntry>> {
        let session_index = self.session.fetch_add(1, Ordering::Relaxed);
        self.select(session_index)
    }

    /// Replace the ranked list after a verification run
    pub fn refresh(&self, ranked: Vec<RankedEntry>) {
        let mut guard = self.entries.write();
        *guard = ranked.into_iter().map(Arc::new).collect();
        // Reset the session counter so rotation restarts at the fastest entry
        self.session.store(0, Ordering::Relaxed);
    }

    pub fn set_policy(&self, policy: RotationPolicy) {
        *self.policy.write() = policy;
    }

    pub fn available_count(&self) -> usize {
        self.entries.read().len()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.policy.read().as_str()
    }
}

impl Default for RotationSelector {
    fn default() -> Self {
        Self::new(RotationPolicy::default())
    }
}
