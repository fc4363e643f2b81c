//! Performance Monitor
//!
//! Times operations, keeps a bounded history of samples, raises alerts when a
//! sample crosses a threshold and derives summaries and recommendations.

use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::config::Thresholds;
use crate::error::{EngineError, Result};
use crate::monitor::memory::{memory_delta, MemoryProbe};
use crate::monitor::recommendations::recommend;
use crate::monitor::summary::{cache_hit_rate, summarize};
use crate::monitor::{Alert, AlertKind, ContextMetrics, PerformanceSample, PerformanceSummary};

pub const DEFAULT_SAMPLE_CAPACITY: usize = 1000;
pub const DEFAULT_ALERT_CAPACITY: usize = 100;
/// Every this many samples the rolling cache hit rate is checked.
pub const HIT_RATE_CHECK_EVERY: u64 = 100;
/// Window of the rolling cache hit rate check.
pub const HIT_RATE_WINDOW: Duration = Duration::from_secs(5 * 60);

const ALERT_CHANNEL_CAPACITY: usize = 64;

pub struct PerformanceMonitor {
    thresholds: Thresholds,
    samples: VecDeque<PerformanceSample>,
    alerts: VecDeque<Alert>,
    sample_capacity: usize,
    alert_capacity: usize,
    recorded: u64,
    probe: MemoryProbe,
    alert_tx: Option<broadcast::Sender<Alert>>,
}

impl PerformanceMonitor {
    pub fn new(thresholds: Thresholds) -> Result<Self> {
        Self::with_capacity(thresholds, DEFAULT_SAMPLE_CAPACITY, DEFAULT_ALERT_CAPACITY)
    }

    pub fn with_capacity(
        thresholds: Thresholds,
        sample_capacity: usize,
        alert_capacity: usize,
    ) -> Result<Self> {
        thresholds.validate()?;
        if sample_capacity == 0 || alert_capacity == 0 {
            return Err(EngineError::Configuration(
                "monitor buffers need a capacity of at least one".to_string(),
            ));
        }
        let (alert_tx, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Ok(Self {
            thresholds,
            samples: VecDeque::with_capacity(sample_capacity),
            alerts: VecDeque::with_capacity(alert_capacity),
            sample_capacity,
            alert_capacity,
            recorded: 0,
            probe: MemoryProbe::new(),
            alert_tx: Some(alert_tx),
        })
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    // == Measurement ==
    /// Runs `f`, records a sample and hands back its result unchanged.
    ///
    /// A failing `f` is recorded with `success = false`.
    pub fn measure<T, E, F>(&mut self, operation: &str, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<EngineError>,
    {
        self.measure_with_metrics(operation, f, |_| None)
    }

    /// Like [`measure`](Self::measure), attaching context figures computed
    /// from the successful result.
    pub fn measure_with_metrics<T, E, F, M>(
        &mut self,
        operation: &str,
        f: F,
        metrics: M,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        M: FnOnce(&T) -> Option<ContextMetrics>,
        E: From<EngineError>,
    {
        self.ensure_live()?;
        let timer = self.start_timer();
        let result = f();
        let context = result.as_ref().ok().and_then(metrics);
        self.finish(operation, timer, result.is_ok(), context);
        result
    }

    pub async fn measure_async<T, E, Fut>(
        &mut self,
        operation: &str,
        fut: Fut,
    ) -> std::result::Result<T, E>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<EngineError>,
    {
        self.measure_async_with_metrics(operation, fut, |_| None).await
    }

    pub async fn measure_async_with_metrics<T, E, Fut, M>(
        &mut self,
        operation: &str,
        fut: Fut,
        metrics: M,
    ) -> std::result::Result<T, E>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
        M: FnOnce(&T) -> Option<ContextMetrics>,
        E: From<EngineError>,
    {
        self.ensure_live()?;
        let timer = self.start_timer();
        let result = fut.await;
        let context = result.as_ref().ok().and_then(metrics);
        self.finish(operation, timer, result.is_ok(), context);
        result
    }

    /// Records a sample timed by the caller.
    pub fn record_metric(&mut self, sample: PerformanceSample) -> Result<()> {
        self.ensure_live()?;
        self.push_sample(sample);
        Ok(())
    }

    // == Queries ==
    /// Summary over samples matching `operation` within the last `window`.
    pub fn summary(
        &self,
        operation: Option<&str>,
        window: Option<Duration>,
    ) -> Result<PerformanceSummary> {
        self.ensure_live()?;
        let since = window
            .and_then(|w| chrono::Duration::from_std(w).ok())
            .map(|w| Utc::now() - w);

        let samples: Vec<&PerformanceSample> = self
            .samples
            .iter()
            .filter(|s| operation.map_or(true, |op| s.operation == op))
            .filter(|s| since.map_or(true, |t| s.started_at >= t))
            .collect();
        let alerts: Vec<Alert> = self
            .alerts
            .iter()
            .filter(|a| match (operation, &a.operation) {
                (Some(op), Some(source)) => op == source,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .filter(|a| since.map_or(true, |t| a.timestamp >= t))
            .cloned()
            .collect();

        Ok(summarize(operation, &samples, alerts))
    }

    /// Tuning advice derived from the summary of every retained sample.
    pub fn recommendations(&self) -> Result<Vec<String>> {
        let summary = self.summary(None, None)?;
        Ok(recommend(&summary, &self.thresholds))
    }

    /// Retained alerts, oldest first.
    pub fn alerts(&self) -> Result<Vec<Alert>> {
        self.ensure_live()?;
        Ok(self.alerts.iter().cloned().collect())
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Receiver for alerts raised from now on.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<Alert>> {
        self.alert_tx
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or(EngineError::NotInitialized("PerformanceMonitor"))
    }

    /// Drops all history and closes alert subscriptions.
    pub fn dispose(&mut self) {
        if self.alert_tx.take().is_some() {
            info!(
                "Performance monitor disposed after {} samples",
                self.recorded
            );
        }
        self.samples.clear();
        self.alerts.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.alert_tx.is_none()
    }

    // == Internals ==
    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(EngineError::NotInitialized("PerformanceMonitor"));
        }
        Ok(())
    }

    fn start_timer(&mut self) -> Timer {
        Timer {
            started_at: Utc::now(),
            instant: Instant::now(),
            memory_before: self.probe.current_bytes(),
        }
    }

    fn finish(
        &mut self,
        operation: &str,
        timer: Timer,
        success: bool,
        context: Option<ContextMetrics>,
    ) {
        let duration_ms = timer.instant.elapsed().as_secs_f64() * 1000.0;
        let memory_after = self.probe.current_bytes();
        let mut sample = PerformanceSample::new(operation, duration_ms)
            .with_started_at(timer.started_at)
            .with_memory_delta(memory_delta(timer.memory_before, memory_after));
        sample.context_metrics = context;
        if !success {
            sample = sample.failed();
        }
        trace!(
            "{} took {:.2} ms (success: {})",
            operation,
            duration_ms,
            success
        );
        self.push_sample(sample);
    }

    fn push_sample(&mut self, sample: PerformanceSample) {
        if self.samples.len() == self.sample_capacity {
            self.samples.pop_front();
        }
        self.check_thresholds(&sample);
        self.samples.push_back(sample);
        self.recorded += 1;

        if self.recorded % HIT_RATE_CHECK_EVERY == 0 {
            self.check_hit_rate();
        }
    }

    fn check_thresholds(&mut self, sample: &PerformanceSample) {
        let limits = &self.thresholds;
        let mut raised = Vec::new();

        let max_ms = limits.max_operation_time_ms as f64;
        if sample.duration_ms > max_ms {
            raised.push(Alert::new(
                AlertKind::SlowOperation,
                Some(sample.operation.clone()),
                format!(
                    "{} took {:.0} ms, limit is {} ms",
                    sample.operation, sample.duration_ms, limits.max_operation_time_ms
                ),
                sample.duration_ms,
                max_ms,
            ));
        }

        let max_bytes = limits.max_memory_bytes() as f64;
        if sample.memory_delta_bytes as f64 > max_bytes {
            raised.push(Alert::new(
                AlertKind::MemoryPressure,
                Some(sample.operation.clone()),
                format!(
                    "{} grew memory by {} bytes, limit is {} MB",
                    sample.operation, sample.memory_delta_bytes, limits.max_memory_mb
                ),
                sample.memory_delta_bytes as f64,
                max_bytes,
            ));
        }

        if let Some(tokens) = sample.tokens() {
            if tokens > limits.max_tokens_per_operation {
                raised.push(Alert::new(
                    AlertKind::TokenLimit,
                    Some(sample.operation.clone()),
                    format!(
                        "{} produced {} tokens, limit is {}",
                        sample.operation, tokens, limits.max_tokens_per_operation
                    ),
                    tokens as f64,
                    limits.max_tokens_per_operation as f64,
                ));
            }
        }

        for alert in raised {
            self.raise(alert);
        }
    }

    fn check_hit_rate(&mut self) {
        let since = match chrono::Duration::from_std(HIT_RATE_WINDOW) {
            Ok(window) => Utc::now() - window,
            Err(e) => {
                warn!("Skipping cache hit rate check: {}", e);
                return;
            }
        };
        let recent = self.samples.iter().filter(|s| s.started_at >= since);
        let Some(rate) = cache_hit_rate(recent) else {
            debug!("No cache activity in the last five minutes");
            return;
        };

        let min = self.thresholds.min_cache_hit_rate_pct;
        if rate < min {
            self.raise(Alert::new(
                AlertKind::LowCacheHitRate,
                None,
                format!("Cache hit rate {:.1}% is below {:.1}%", rate, min),
                rate,
                min,
            ));
        }
    }

    fn raise(&mut self, alert: Alert) {
        warn!("Performance alert: {}", alert.message);
        if let Some(tx) = &self.alert_tx {
            // No subscribers is fine
            if tx.send(alert.clone()).is_err() {
                trace!("Alert dropped, nobody subscribed");
            }
        }
        if self.alerts.len() == self.alert_capacity {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }
}

struct Timer {
    started_at: chrono::DateTime<Utc>,
    instant: Instant,
    memory_before: Option<u64>,
}
