//! Queue-level counters and rolling outcome aggregation.
//!
//! Counters are shared across a queue's worker tasks, so the monotonic
//! totals use atomic increments and the rolling window sits behind a
//! short-lived lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// Snapshot returned by `queue_metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct QueueMetrics {
    pub queue_name: String,
    pub waiting: usize,
    pub active: usize,
    pub completed: u64,
    pub failed: u64,
    pub delayed: usize,
    pub paused: bool,
    /// failed / (failed + completed) over the recent outcome window.
    pub error_rate: f64,
    pub avg_processing_time_ms: u64,
}

/// Rolling window length for error-rate and latency aggregation.
const OUTCOME_WINDOW: usize = 100;

#[derive(Debug, Clone, Copy)]
struct Outcome {
    success: bool,
    processing: Duration,
}

/// Cross-job counters for one queue.
#[derive(Debug, Default)]
pub struct QueueCounters {
    completed: AtomicU64,
    failed: AtomicU64,
    recent: Mutex<VecDeque<Outcome>>,
}

impl QueueCounters {
    pub fn record_completion(&self, processing: Duration) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.push(Outcome {
            success: true,
            processing,
        });
    }

    pub fn record_failure(&self, processing: Duration) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.push(Outcome {
            success: false,
            processing,
        });
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Terminal failures over terminal outcomes in the recent window.
    pub fn error_rate(&self) -> f64 {
        let Ok(recent) = self.recent.lock() else {
            return 0.0;
        };
        if recent.is_empty() {
            return 0.0;
        }
        let failures = recent.iter().filter(|o| !o.success).count();
        failures as f64 / recent.len() as f64
    }

    /// Mean processing time over the recent window.
    pub fn avg_processing_time(&self) -> Duration {
        let Ok(recent) = self.recent.lock() else {
            return Duration::ZERO;
        };
        if recent.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = recent.iter().map(|o| o.processing).sum();
        total / recent.len() as u32
    }

    fn push(&self, outcome: Outcome) {
        if let Ok(mut recent) = self.recent.lock() {
            recent.push_back(outcome);
            while recent.len() > OUTCOME_WINDOW {
                recent.pop_front();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_counters() {
        let counters = QueueCounters::default();
        assert_eq!(counters.completed(), 0);
        assert_eq!(counters.failed(), 0);
        assert_eq!(counters.error_rate(), 0.0);
        assert_eq!(counters.avg_processing_time(), Duration::ZERO);
    }

    #[test]
    fn test_error_rate_over_window() {
        let counters = QueueCounters::default();
        counters.record_completion(Duration::from_millis(100));
        counters.record_completion(Duration::from_millis(100));
        counters.record_failure(Duration::from_millis(100));
        counters.record_failure(Duration::from_millis(100));
        assert!((counters.error_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_avg_processing_time() {
        let counters = QueueCounters::default();
        counters.record_completion(Duration::from_millis(100));
        counters.record_completion(Duration::from_millis(300));
        assert_eq!(counters.avg_processing_time(), Duration::from_millis(200));
    }

    #[test]
    fn test_window_bounds_recent_outcomes() {
        let counters = QueueCounters::default();
        // Fill the window with failures, then push enough successes to
        // evict them all.
        for _ in 0..OUTCOME_WINDOW {
            counters.record_failure(Duration::from_millis(1));
        }
        for _ in 0..OUTCOME_WINDOW {
            counters.record_completion(Duration::from_millis(1));
        }
        assert_eq!(counters.error_rate(), 0.0);
        // Monotonic totals are unaffected by the window.
        assert_eq!(counters.failed(), OUTCOME_WINDOW as u64);
        assert_eq!(counters.completed(), OUTCOME_WINDOW as u64);
    }
}
