//! Pipeline configuration.
//!
//! Everything the pipeline and scheduler need at startup lives in one
//! [`PipelineConfig`]: the chunk token budget, the cost ceiling and pricing,
//! the retry policy for collaborator calls, and the per-queue scheduler
//! settings. Configuration loads from a TOML file with `REVPIPE_`-prefixed
//! environment overrides, and is validated into a
//! [`PipelineError::Configuration`] before any work starts.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cost::TokenPricing;
use crate::error::PipelineError;
use crate::queue::SchedulerConfig;
use crate::retry::RetryPolicy;

/// Context budget settings for the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Token ceiling for one analysis invocation.
    pub max_tokens_per_chunk: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: 24_000,
        }
    }
}

/// Spend ceiling and pricing for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    /// Hard USD ceiling per run; at or below zero means unlimited.
    pub ceiling_usd: f64,
    #[serde(default)]
    pub pricing: TokenPricing,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            ceiling_usd: 5.0,
            pricing: TokenPricing::default(),
        }
    }
}

/// Top-level configuration for the pipeline and scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub cost: CostConfig,
    /// Backoff policy for collaborator calls within one job.
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl PipelineConfig {
    pub fn with_budget(mut self, budget: BudgetConfig) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_cost(mut self, cost: CostConfig) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Load from a TOML file, apply `REVPIPE_`-prefixed environment
    /// overrides, and validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let built = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()))
            .add_source(::config::Environment::with_prefix("REVPIPE").separator("__"))
            .build()
            .map_err(|err| PipelineError::Configuration(err.to_string()))?;
        let parsed: PipelineConfig = built
            .try_deserialize()
            .map_err(|err| PipelineError::Configuration(err.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Reject invalid settings before any work starts.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.budget.max_tokens_per_chunk == 0 {
            return Err(PipelineError::Configuration(
                "budget.max_tokens_per_chunk must be positive".to_string(),
            ));
        }
        if self.cost.pricing.input_cost_per_1k < 0.0 || self.cost.pricing.output_cost_per_1k < 0.0
        {
            return Err(PipelineError::Configuration(
                "cost.pricing must not be negative".to_string(),
            ));
        }
        self.retry.validate()?;
        self.scheduler.validate()?;
        Ok(())
    }
}
