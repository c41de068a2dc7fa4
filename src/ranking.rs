//! Latency classification and ranking

use crate::models::{ProbeResult, ProbeStatus, RankedEntry};

/// Map a measured total onto a status
///
/// Active below `active_threshold_ms`, slow up to and including
/// `max_acceptable_ms`, dead beyond.
pub fn classify(
    total_time_ms: u64,
    active_threshold_ms: u64,
    max_acceptable_ms: u64,
) -> ProbeStatus {
    if total_time_ms < active_threshold_ms {
        ProbeStatus::Active
    } else if total_time_ms <= max_acceptable_ms {
        ProbeStatus::Slow
    } else {
        ProbeStatus::Dead
    }
}

/// Keep usable results inside `[min_ping_ms, max_ping_ms]`, fastest first
///
/// The sort is stable, so equal response times keep input order.
pub fn filter_and_sort(
    results: &[ProbeResult],
    min_ping_ms: u64,
    max_ping_ms: u64,
) -> Vec<RankedEntry> {
    let mut ranked: Vec<RankedEntry> = results
        .iter()
        .filter(|result| result.is_usable())
        .filter(|result| (min_ping_ms..=max_ping_ms).contains(&result.total_time_ms))
        .map(|result| RankedEntry {
            proxy: result.proxy.clone(),
            response_time_ms: result.total_time_ms,
        })
        .collect();

    ranked.sort_by_key(|entry| entry.response_time_ms);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{ProxyDescriptor, TierTimings, DEAD_SENTINEL_MS};

    fn usable(raw: &str, ms: u64) -> ProbeResult {
        let status = classify(ms, 2000, 5000);
        ProbeResult::usable(
            ProxyDescriptor::parse(raw).unwrap(),
            status,
            ms,
            TierTimings::new(),
            None,
        )
    }

    #[test]
    fn test_classify_examples() {
        assert_eq!(classify(500, 2000, 5000), ProbeStatus::Active);
        assert_eq!(classify(2500, 2000, 5000), ProbeStatus::Slow);
        assert_eq!(classify(DEAD_SENTINEL_MS, 2000, 5000), ProbeStatus::Dead);
    }

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(classify(1999, 2000, 5000), ProbeStatus::Active);
        assert_eq!(classify(2000, 2000, 5000), ProbeStatus::Slow);
        assert_eq!(classify(5000, 2000, 5000), ProbeStatus::Slow);
        assert_eq!(classify(5001, 2000, 5000), ProbeStatus::Dead);
    }

    #[test]
    fn test_filter_and_sort_band_and_order() {
        let results = vec![
            usable("10.0.0.1:80", 900),
            usable("10.0.0.2:80", 50),
            usable("10.0.0.3:80", 2500),
            ProbeResult::dead("10.0.0.4:80", None, TierTimings::new(), ErrorKind::Timeout, "t"),
            usable("10.0.0.5:80", 100),
            usable("10.0.0.6:80", 4000),
        ];

        let ranked = filter_and_sort(&results, 100, 3000);
        let proxies: Vec<&str> = ranked.iter().map(|e| e.proxy.as_str()).collect();
        assert_eq!(proxies, vec!["10.0.0.5:80", "10.0.0.1:80", "10.0.0.3:80"]);

        assert!(ranked
            .windows(2)
            .all(|pair| pair[0].response_time_ms <= pair[1].response_time_ms));
        assert!(ranked
            .iter()
            .all(|e| (100..=3000).contains(&e.response_time_ms)));
    }

    #[test]
    fn test_filter_and_sort_ties_keep_input_order() {
        let results = vec![
            usable("10.0.0.1:80", 300),
            usable("10.0.0.2:80", 200),
            usable("10.0.0.3:80", 300),
            usable("10.0.0.4:80", 200),
        ];

        let ranked = filter_and_sort(&results, 0, 5000);
        let proxies: Vec<&str> = ranked.iter().map(|e| e.proxy.as_str()).collect();
        assert_eq!(
            proxies,
            vec!["10.0.0.2:80", "10.0.0.4:80", "10.0.0.1:80", "10.0.0.3:80"]
        );
    }

    #[test]
    fn test_filter_and_sort_excludes_dead_even_inside_band() {
        let results = vec![ProbeResult::dead(
            "10.0.0.9:80",
            None,
            TierTimings::new(),
            ErrorKind::DnsFailure,
            "nx",
        )];
        assert!(filter_and_sort(&results, 0, u64::MAX).is_empty());
    }
}
