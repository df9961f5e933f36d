//! Bounded exponential backoff around a single async operation.
//!
//! The executor retries transient failures with exponentially increasing,
//! jittered delays until the policy's attempt budget is spent, then raises a
//! terminal [`PipelineError::RetryExhausted`] carrying the last underlying
//! error. Rate-limit failures that supply their own retry-after delay
//! override the computed backoff for that attempt. Non-retryable errors
//! propagate immediately.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PipelineError;

/// Backoff policy for a retried operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first (1 = no retries).
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Cap on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied per retry (typically 2.0).
    pub backoff_multiplier: f64,
    /// Uniform jitter range around the computed delay, in `[0.0, 1.0)`.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// No retries at all: a single attempt, failure is terminal.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay_ms(mut self, ms: u64) -> Self {
        self.initial_delay_ms = ms;
        self
    }

    pub fn with_max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter;
        self
    }

    /// Pre-jitter delay before the retry following `retries_so_far`
    /// failures: `min(max_delay, initial * multiplier ^ retries_so_far)`.
    pub fn delay_for_attempt(&self, retries_so_far: u32) -> Duration {
        let base =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi(retries_so_far as i32);
        Duration::from_millis(base.min(self.max_delay_ms as f64) as u64)
    }

    /// Reject nonsensical policies before any work starts.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_attempts == 0 {
            return Err(PipelineError::Configuration(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(PipelineError::Configuration(format!(
                "retry backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if !(0.0..1.0).contains(&self.jitter_factor) {
            return Err(PipelineError::Configuration(format!(
                "retry jitter_factor must be in [0, 1), got {}",
                self.jitter_factor
            )));
        }
        Ok(())
    }
}

/// Attempt bookkeeping for one named operation. Observability only.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OperationStats {
    /// Attempts started, successful or not.
    pub attempts: u64,
    /// Attempts that were retried after a transient failure.
    pub retries: u64,
    /// Terminal failures (exhausted or non-retryable).
    pub failures: u64,
    /// Wall-clock time spent inside the operation across all attempts.
    pub total_latency_ms: u64,
}

/// Wraps async operations with the retry policy and tracks per-operation
/// stats. Cheap to clone; clones share the stats map.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    stats: Arc<Mutex<HashMap<String, OperationStats>>>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            stats: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation`, retrying transient failures until the policy is
    /// exhausted. The closure is invoked once per attempt.
    pub async fn execute<T, F, Fut>(
        &self,
        name: &str,
        mut operation: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let mut attempts_made = 0u32;
        loop {
            let started = Instant::now();
            let result = operation().await;
            self.note_attempt(name, started.elapsed());

            match result {
                Ok(value) => {
                    if attempts_made > 0 {
                        debug!(
                            operation = name,
                            retries = attempts_made,
                            "operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    attempts_made += 1;
                    if !err.is_retryable() {
                        self.note_failure(name);
                        return Err(err);
                    }
                    if attempts_made >= self.policy.max_attempts {
                        self.note_failure(name);
                        return Err(PipelineError::RetryExhausted {
                            operation: name.to_string(),
                            attempts: attempts_made,
                            source: Box::new(err),
                        });
                    }
                    let delay = err
                        .retry_after()
                        .unwrap_or_else(|| self.jittered_delay(attempts_made - 1));
                    warn!(
                        operation = name,
                        attempt = attempts_made,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after backoff"
                    );
                    self.note_retry(name);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Computed backoff delay with a uniform random factor in
    /// `±jitter_factor` applied.
    fn jittered_delay(&self, retries_so_far: u32) -> Duration {
        let base = self.policy.delay_for_attempt(retries_so_far);
        let jitter = self.policy.jitter_factor;
        if jitter <= 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter);
        Duration::from_secs_f64(base.as_secs_f64() * factor)
    }

    /// Stats for one named operation, if it ran.
    pub fn stats(&self, name: &str) -> Option<OperationStats> {
        self.stats
            .lock()
            .ok()
            .and_then(|map| map.get(name).copied())
    }

    /// Snapshot of all per-operation stats.
    pub fn all_stats(&self) -> HashMap<String, OperationStats> {
        self.stats
            .lock()
            .map(|map| map.clone())
            .unwrap_or_default()
    }

    fn note_attempt(&self, name: &str, latency: Duration) {
        if let Ok(mut map) = self.stats.lock() {
            let entry = map.entry(name.to_string()).or_default();
            entry.attempts += 1;
            entry.total_latency_ms += latency.as_millis() as u64;
        }
    }

    fn note_retry(&self, name: &str) {
        if let Ok(mut map) = self.stats.lock() {
            map.entry(name.to_string()).or_default().retries += 1;
        }
    }

    fn note_failure(&self, name: &str) {
        if let Ok(mut map) = self.stats.lock() {
            map.entry(name.to_string()).or_default().failures += 1;
        }
    }
}
