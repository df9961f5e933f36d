//! Cumulative spend tracking and the dispatch cost gate.
//!
//! One [`CostTracker`] is instantiated per pipeline run and passed by
//! reference through the chunk loop; it is never shared across concurrent
//! jobs, so concurrent runs stay independently testable. The gate is checked
//! *before* each dispatch, never after: work already in flight completes and
//! is recorded, but no new dispatch begins once the ceiling is reached.
//!
//! The check returns an explicit [`DispatchDecision`] rather than raising an
//! error, so the chunk loop's termination condition stays visible in its
//! control structure.

use serde::{Deserialize, Serialize};

use crate::review::types::UsageTotals;

/// Per-1K-token pricing for the model behind the analysis call. Used to fill
/// in a cost figure when the collaborator reports tokens without one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPricing {
    /// USD per 1K prompt tokens.
    pub input_cost_per_1k: f64,
    /// USD per 1K completion tokens.
    pub output_cost_per_1k: f64,
    /// Model name for reference.
    pub model: String,
}

impl Default for TokenPricing {
    fn default() -> Self {
        Self {
            input_cost_per_1k: 0.003,
            output_cost_per_1k: 0.015,
            model: "claude-sonnet".to_string(),
        }
    }
}

impl TokenPricing {
    /// Calculate cost in USD for the given token counts.
    pub fn cost_usd(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        let input = (prompt_tokens as f64 / 1000.0) * self.input_cost_per_1k;
        let output = (completion_tokens as f64 / 1000.0) * self.output_cost_per_1k;
        input + output
    }
}

/// Cumulative spend for one pipeline run. Discarded at run end, or handed to
/// an external audit sink.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CostRecord {
    pub total_tokens: u64,
    pub total_cost_usd: f64,
}

/// Continuation signal returned by the gate check.
#[derive(Debug, Clone)]
pub struct DispatchDecision {
    pub should_continue: bool,
    pub reason: String,
}

impl DispatchDecision {
    fn allow() -> Self {
        Self {
            should_continue: true,
            reason: "under cost ceiling".to_string(),
        }
    }

    fn stop(reason: impl Into<String>) -> Self {
        Self {
            should_continue: false,
            reason: reason.into(),
        }
    }
}

/// Stateless gate decision: may another dispatch begin at this spend level?
/// A ceiling at or below zero means unlimited.
pub fn can_dispatch(current_total_usd: f64, ceiling_usd: f64) -> bool {
    ceiling_usd <= 0.0 || current_total_usd < ceiling_usd
}

/// Tracks spend for a single run.
#[derive(Debug, Clone)]
pub struct CostTracker {
    ceiling_usd: f64,
    pricing: TokenPricing,
    record: CostRecord,
}

impl CostTracker {
    pub fn new(ceiling_usd: f64) -> Self {
        Self::with_pricing(ceiling_usd, TokenPricing::default())
    }

    pub fn with_pricing(ceiling_usd: f64, pricing: TokenPricing) -> Self {
        Self {
            ceiling_usd,
            pricing,
            record: CostRecord::default(),
        }
    }

    /// Gate check, run before each chunk dispatch.
    pub fn check(&self) -> DispatchDecision {
        if can_dispatch(self.record.total_cost_usd, self.ceiling_usd) {
            DispatchDecision::allow()
        } else {
            DispatchDecision::stop(format!(
                "cost ceiling reached: ${:.4} of ${:.4} spent",
                self.record.total_cost_usd, self.ceiling_usd
            ))
        }
    }

    /// Record usage from a completed dispatch and return the new total.
    ///
    /// When the collaborator reported only token counts, the cost is filled
    /// in from the configured pricing.
    pub fn record_usage(&mut self, usage: &UsageTotals) -> CostRecord {
        let tokens = if usage.total_tokens > 0 {
            usage.total_tokens
        } else {
            usage.prompt_tokens + usage.completion_tokens
        };
        let cost = if usage.cost_usd > 0.0 {
            usage.cost_usd
        } else {
            self.pricing
                .cost_usd(usage.prompt_tokens, usage.completion_tokens)
        };
        self.record.total_tokens += tokens;
        self.record.total_cost_usd += cost;
        self.record
    }

    /// Current cumulative spend.
    pub fn spent(&self) -> CostRecord {
        self.record
    }

    pub fn ceiling_usd(&self) -> f64 {
        self.ceiling_usd
    }
}
