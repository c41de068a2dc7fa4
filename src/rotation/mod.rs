//! Proxy rotation policies
//!
//! Picks one entry of a ranked list for each orchestrator session.

mod selector;

pub use selector::RotationSelector;

use std::time::Duration;

use rand::Rng;

use crate::models::RankedEntry;

pub const DEFAULT_TOP_K: usize = 3;

/// Policy types for session rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationPolicy {
    /// Always the fastest entry
    FastestFirst,
    /// `ranked[session_index % len]`
    #[default]
    RoundRobin,
    /// Uniform choice among the fastest `k` entries
    TopKRandom { k: usize },
}

impl RotationPolicy {
    /// Parse a policy name, falling back to round-robin for unknown names
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "fastest" | "fastest_first" | "fastest-first" | "fastestfirst" => Self::FastestFirst,
            "top_k_random" | "top-k-random" | "topk" | "top_k" | "random" => {
                Self::TopKRandom { k: DEFAULT_TOP_K }
            }
            _ => Self::RoundRobin,
        }
    }

    /// Override `k` for the top-k policy; other policies are returned unchanged
    pub fn with_top_k(self, k: usize) -> Self {
        match self {
            Self::TopKRandom { .. } => Self::TopKRandom { k },
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FastestFirst => "fastest_first",
            Self::RoundRobin => "round_robin",
            Self::TopKRandom { .. } => "top_k_random",
        }
    }
}

/// Pick the entry for `session_index` under `policy`
///
/// `None` means the session should run without a proxy.
pub fn select(
    ranked: &[RankedEntry],
    session_index: usize,
    policy: RotationPolicy,
) -> Option<&RankedEntry> {
    pick_index(ranked.len(), session_index, policy).and_then(|idx| ranked.get(idx))
}

/// Index chosen by `policy` in a list of `len` entries
pub(crate) fn pick_index(
    len: usize,
    session_index: usize,
    policy: RotationPolicy,
) -> Option<usize> {
    if len == 0 {
        return None;
    }

    match policy {
        RotationPolicy::FastestFirst => Some(0),
        RotationPolicy::RoundRobin => Some(session_index % len),
        RotationPolicy::TopKRandom { k } => {
            let k = k.clamp(1, len);
            Some(rand::thread_rng().gen_range(0..k))
        }
    }
}

/// Pause before the next session: at least `base_delay`, stretched to twice
/// the proxy's response time for slow proxies
pub fn session_delay(selected: Option<&RankedEntry>, base_delay: Duration) -> Duration {
    match selected {
        Some(entry) => {
            base_delay.max(Duration::from_millis(entry.response_time_ms.saturating_mul(2)))
        }
        None => base_delay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(times: &[u64]) -> Vec<RankedEntry> {
        times
            .iter()
            .enumerate()
            .map(|(i, &ms)| RankedEntry {
                proxy: format!("10.0.0.{}:8080", i + 1),
                response_time_ms: ms,
            })
            .collect()
    }

    #[test]
    fn test_rotation_policy_from_str() {
        assert_eq!(
            RotationPolicy::from_str("fastest-first"),
            RotationPolicy::FastestFirst
        );
        assert_eq!(
            RotationPolicy::from_str("Round-Robin"),
            RotationPolicy::RoundRobin
        );
        assert_eq!(
            RotationPolicy::from_str("top_k_random"),
            RotationPolicy::TopKRandom { k: DEFAULT_TOP_K }
        );
        assert_eq!(
            RotationPolicy::from_str("unknown"),
            RotationPolicy::RoundRobin
        );
    }

    #[test]
    fn test_rotation_policy_with_top_k() {
        assert_eq!(
            RotationPolicy::from_str("topk").with_top_k(7),
            RotationPolicy::TopKRandom { k: 7 }
        );
        assert_eq!(
            RotationPolicy::FastestFirst.with_top_k(7),
            RotationPolicy::FastestFirst
        );
        assert_eq!(RotationPolicy::TopKRandom { k: 2 }.as_str(), "top_k_random");
    }

    #[test]
    fn test_select_empty_list_returns_none() {
        let empty: Vec<RankedEntry> = Vec::new();
        assert!(select(&empty, 0, RotationPolicy::FastestFirst).is_none());
        assert!(select(&empty, 3, RotationPolicy::RoundRobin).is_none());
        assert!(select(&empty, 0, RotationPolicy::TopKRandom { k: 3 }).is_none());
    }

    #[test]
    fn test_select_fastest_first() {
        let list = ranked(&[120, 300, 900]);
        for session in 0..5 {
            assert_eq!(
                select(&list, session, RotationPolicy::FastestFirst).unwrap().response_time_ms,
                120
            );
        }
    }

    #[test]
    fn test_select_round_robin_wraps() {
        let list = ranked(&[120, 300, 900]);
        let picked: Vec<u64> = (0..6)
            .map(|s| select(&list, s, RotationPolicy::RoundRobin).unwrap().response_time_ms)
            .collect();
        assert_eq!(picked, vec![120, 300, 900, 120, 300, 900]);
    }

    #[test]
    fn test_select_top_k_random_stays_within_k() {
        let list = ranked(&[100, 200, 300, 400, 500]);
        for session in 0..50 {
            let entry = select(&list, session, RotationPolicy::TopKRandom { k: 2 }).unwrap();
            assert!(entry.response_time_ms <= 200);
        }

        // k larger than the list is clamped
        let short = ranked(&[100]);
        let entry = select(&short, 0, RotationPolicy::TopKRandom { k: 10 }).unwrap();
        assert_eq!(entry.response_time_ms, 100);
    }

    #[test]
    fn test_session_delay() {
        let base = Duration::from_secs(3);
        assert_eq!(session_delay(None, base), base);

        let fast = RankedEntry {
            proxy: "a:1".to_string(),
            response_time_ms: 400,
        };
        assert_eq!(session_delay(Some(&fast), base), base);

        let slow = RankedEntry {
            proxy: "b:1".to_string(),
            response_time_ms: 2500,
        };
        assert_eq!(session_delay(Some(&slow), base), Duration::from_millis(5000));
    }
}
