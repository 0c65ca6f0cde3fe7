//! Lightweight performance sampling
//!
//! [`PerformanceMonitor`] keeps a bounded window of recent durations per
//! operation name and summarizes them on demand.

use super::{
    log_level::LogLevel,
    logger::{LogOptions, Logger},
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Samples kept per operation by default
pub const DEFAULT_SAMPLE_WINDOW: usize = 1000;

/// Summary of one operation's recent samples
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceStats {
    pub operation: String,
    pub count: usize,
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
    pub p95: Duration,
}

impl PerformanceStats {
    fn from_samples(operation: &str, samples: &VecDeque<Duration>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<Duration> = samples.iter().copied().collect();
        sorted.sort_unstable();

        let count = sorted.len();
        let total: Duration = sorted.iter().sum();
        // Nearest-rank percentile
        let rank = ((count as f64) * 0.95).ceil() as usize;
        let p95 = sorted[rank.clamp(1, count) - 1];

        Some(Self {
            operation: operation.to_string(),
            count,
            min: sorted[0],
            max: sorted[count - 1],
            mean: total / count as u32,
            p95,
        })
    }
}

#[derive(Debug)]
pub struct PerformanceMonitor {
    samples: Mutex<HashMap<String, VecDeque<Duration>>>,
    window: usize,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_SAMPLE_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            samples: Mutex::new(HashMap::new()),
            window: window.max(1),
        }
    }

    pub fn record(&self, operation: &str, duration: Duration) {
        let mut samples = self.samples.lock();
        let window = samples.entry(operation.to_string()).or_default();
        if window.len() >= self.window {
            window.pop_front();
        }
        window.push_back(duration);
    }

    /// Start a timer that records when stopped or dropped
    pub fn start(&self, operation: impl Into<String>) -> PerformanceTimer<'_> {
        PerformanceTimer {
            monitor: self,
            operation: operation.into(),
            started: Some(Instant::now()),
        }
    }

    pub fn stats(&self, operation: &str) -> Option<PerformanceStats> {
        let samples = self.samples.lock();
        samples
            .get(operation)
            .and_then(|window| PerformanceStats::from_samples(operation, window))
    }

    /// Stats for every operation, sorted by name
    pub fn report(&self) -> Vec<PerformanceStats> {
        let samples = self.samples.lock();
        let mut report: Vec<PerformanceStats> = samples
            .iter()
            .filter_map(|(name, window)| PerformanceStats::from_samples(name, window))
            .collect();
        report.sort_by(|a, b| a.operation.cmp(&b.operation));
        report
    }

    /// Write one info entry per operation through `logger`
    pub fn log_report(&self, logger: &Logger) {
        for stats in self.report() {
            let options = LogOptions::new()
                .with_field("operation", stats.operation.clone())
                .with_field("count", stats.count as u64)
                .with_field("minMs", stats.min.as_secs_f64() * 1000.0)
                .with_field("maxMs", stats.max.as_secs_f64() * 1000.0)
                .with_field("meanMs", stats.mean.as_secs_f64() * 1000.0)
                .with_field("p95Ms", stats.p95.as_secs_f64() * 1000.0)
                .with_tag("performance");
            logger.log_with(
                LogLevel::Info,
                format!("Performance report: {}", stats.operation),
                options,
            );
        }
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Records the elapsed time into its monitor on `stop` or drop
#[must_use = "the timer records when dropped"]
pub struct PerformanceTimer<'a> {
    monitor: &'a PerformanceMonitor,
    operation: String,
    started: Option<Instant>,
}

impl PerformanceTimer<'_> {
    pub fn stop(mut self) -> Duration {
        self.finish().unwrap_or_default()
    }

    fn finish(&mut self) -> Option<Duration> {
        let elapsed = self.started.take()?.elapsed();
        self.monitor.record(&self.operation, elapsed);
        Some(elapsed)
    }
}

impl Drop for PerformanceTimer<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}
