//! Rule-based tuning advice derived from a summary

use crate::config::Thresholds;
use crate::monitor::PerformanceSummary;

const LOW_HIT_RATE_PCT: f64 = 50.0;
const NEAR_LIMIT_RATIO: f64 = 0.8;
const NOISY_ALERT_COUNT: usize = 10;

pub fn recommend(summary: &PerformanceSummary, thresholds: &Thresholds) -> Vec<String> {
    let mut advice = Vec::new();
    if summary.count == 0 {
        return advice;
    }

    if let Some(rate) = summary.cache_hit_rate {
        if rate < LOW_HIT_RATE_PCT {
            advice.push(format!(
                "Cache hit rate is {:.1}%: warm the cache with frequently used contexts",
                rate
            ));
        }
    }

    let memory_limit = thresholds.max_memory_bytes() as f64;
    if summary.memory_peak_bytes as f64 > memory_limit * NEAR_LIMIT_RATIO {
        advice.push(format!(
            "Memory peak of {} bytes is above 80% of the {} MB limit: use more aggressive optimization or a smaller cache",
            summary.memory_peak_bytes, thresholds.max_memory_mb
        ));
    }

    if summary.p95_ms > thresholds.max_operation_time_ms as f64 {
        advice.push(format!(
            "p95 latency {:.0} ms exceeds {} ms: enable caching or assemble fewer items per call",
            summary.p95_ms, thresholds.max_operation_time_ms
        ));
    }

    if let Some(avg) = summary.avg_tokens {
        if avg > thresholds.max_tokens_per_operation as f64 * NEAR_LIMIT_RATIO {
            advice.push(format!(
                "Average context of {:.0} tokens is close to the {} token limit: enable summarization or lower the budget",
                avg, thresholds.max_tokens_per_operation
            ));
        }
    }

    if summary.alerts.len() >= NOISY_ALERT_COUNT {
        advice.push(format!(
            "{} alerts recorded: review thresholds or the operations triggering them",
            summary.alerts.len()
        ));
    }

    advice
}
