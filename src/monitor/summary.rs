//! Rolling summaries over recorded samples

use serde::Serialize;

use crate::monitor::{Alert, PerformanceSample};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub operation: Option<String>,
    pub count: usize,
    pub avg_duration_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    /// Largest memory delta seen in the window
    pub memory_peak_bytes: i64,
    /// Percentage of samples with cache information that were hits
    pub cache_hit_rate: Option<f64>,
    /// Mean tokens per sample carrying a token count
    pub avg_tokens: Option<f64>,
    /// Tokens per second of measured time
    pub token_throughput: f64,
    pub error_count: usize,
    pub alerts: Vec<Alert>,
}

/// Value at index `floor(n * q)` of the sorted input, clamped to the last one.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 * q).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Percentage of hits among samples that report cache usage.
pub fn cache_hit_rate<'a, I>(samples: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a PerformanceSample>,
{
    let (hits, total) = samples
        .into_iter()
        .filter_map(|s| s.cache_hit())
        .fold((0usize, 0usize), |(h, t), hit| (h + usize::from(hit), t + 1));
    if total == 0 {
        None
    } else {
        Some(hits as f64 / total as f64 * 100.0)
    }
}

pub fn summarize(
    operation: Option<&str>,
    samples: &[&PerformanceSample],
    alerts: Vec<Alert>,
) -> PerformanceSummary {
    let count = samples.len();
    if count == 0 {
        return PerformanceSummary {
            operation: operation.map(str::to_string),
            alerts,
            ..PerformanceSummary::default()
        };
    }

    let mut durations: Vec<f64> = samples.iter().map(|s| s.duration_ms).collect();
    durations.sort_by(|a, b| a.total_cmp(b));
    let total_ms: f64 = durations.iter().sum();

    let token_counts: Vec<usize> = samples.iter().filter_map(|s| s.tokens()).collect();
    let total_tokens: usize = token_counts.iter().sum();
    let avg_tokens = if token_counts.is_empty() {
        None
    } else {
        Some(total_tokens as f64 / token_counts.len() as f64)
    };
    let token_throughput = if total_ms > 0.0 {
        total_tokens as f64 / (total_ms / 1000.0)
    } else {
        0.0
    };

    PerformanceSummary {
        operation: operation.map(str::to_string),
        count,
        avg_duration_ms: total_ms / count as f64,
        p95_ms: percentile(&durations, 0.95),
        p99_ms: percentile(&durations, 0.99),
        memory_peak_bytes: samples
            .iter()
            .map(|s| s.memory_delta_bytes)
            .max()
            .unwrap_or(0),
        cache_hit_rate: cache_hit_rate(samples.iter().copied()),
        avg_tokens,
        token_throughput,
        error_count: samples.iter().filter(|s| !s.success).count(),
        alerts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::ContextMetrics;

    #[test]
    fn test_percentile_indexing() {
        let sorted: Vec<f64> = (1..=100).map(f64::from).collect();
        // floor(100 * 0.95) = 95 -> 96th value
        assert_eq!(percentile(&sorted, 0.95), 96.0);
        assert_eq!(percentile(&sorted, 0.99), 100.0);
        assert_eq!(percentile(&[7.0], 0.99), 7.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn test_summarize_figures() {
        let samples = vec![
            PerformanceSample::new("op", 100.0).with_metrics(ContextMetrics {
                tokens: Some(500),
                cache_hit: Some(true),
                items: None,
            }),
            PerformanceSample::new("op", 300.0)
                .with_memory_delta(2048)
                .with_metrics(ContextMetrics {
                    tokens: Some(300),
                    cache_hit: Some(false),
                    items: None,
                })
                .failed(),
        ];
        let refs: Vec<&PerformanceSample> = samples.iter().collect();

        let summary = summarize(Some("op"), &refs, Vec::new());

        assert_eq!(summary.count, 2);
        assert_eq!(summary.avg_duration_ms, 200.0);
        assert_eq!(summary.p95_ms, 300.0);
        assert_eq!(summary.memory_peak_bytes, 2048);
        assert_eq!(summary.cache_hit_rate, Some(50.0));
        assert_eq!(summary.avg_tokens, Some(400.0));
        assert_eq!(summary.token_throughput, 2000.0);
        assert_eq!(summary.error_count, 1);
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(None, &[], Vec::new());
        assert_eq!(summary.count, 0);
        assert_eq!(summary.cache_hit_rate, None);
    }
}
