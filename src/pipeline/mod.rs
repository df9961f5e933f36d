//! The review analysis pipeline: plan, cost-gated dispatch, merge.
//!
//! One [`ReviewPipeline`] handles a `pr-analysis` / `code-analysis` job end
//! to end: the planner partitions the payload's changes and findings into
//! budget-bounded chunks, then the chunk loop dispatches them **strictly
//! sequentially**: the cost gate must see an up-to-date total before each
//! dispatch, and parallel dispatch would let the run overshoot the ceiling
//! by an unbounded multiple of one chunk's cost. Each dispatch is wrapped in
//! the retry executor; chunk-scoped failures are dropped with a warning
//! after retries and never fail the job unless no chunk succeeds.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::budget::ContextBudgetPlanner;
use crate::config::PipelineConfig;
use crate::cost::{CostRecord, CostTracker, TokenPricing};
use crate::error::PipelineError;
use crate::merge::ResultMerger;
use crate::queue::{Job, JobProcessor};
use crate::retry::RetryExecutor;
use crate::review::types::{
    ChunkRequest, Review, ReviewJobPayload, ReviewMetrics, ReviewSummary, UsageTotals, Verdict,
};

/// Boundary to the downstream analysis service.
///
/// Implementations receive one chunk-scoped request and return the raw
/// structured response; the pipeline validates it against the [`Review`]
/// shape. Transport, prompting, and model choice all live behind this trait.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(&self, request: &ChunkRequest) -> Result<serde_json::Value, PipelineError>;
}

/// Fire-and-forget sink for per-run cost records.
#[async_trait]
pub trait CostSink: Send + Sync {
    async fn record_run(&self, job_id: &str, record: &CostRecord);
}

/// Validate a raw collaborator response against the review contract.
pub fn validate_review(raw: serde_json::Value) -> Result<Review, PipelineError> {
    let review: Review = serde_json::from_value(raw)
        .map_err(|err| PipelineError::SchemaValidation(err.to_string()))?;
    if !(0.0..=1.0).contains(&review.summary.confidence) {
        return Err(PipelineError::SchemaValidation(format!(
            "confidence {} outside [0, 1]",
            review.summary.confidence
        )));
    }
    Ok(review)
}

/// Drives one review job through plan → gate → dispatch → merge.
pub struct ReviewPipeline {
    planner: ContextBudgetPlanner,
    merger: ResultMerger,
    retry: RetryExecutor,
    provider: Arc<dyn AnalysisProvider>,
    cost_sink: Option<Arc<dyn CostSink>>,
    budget_tokens: u64,
    cost_ceiling_usd: f64,
    pricing: TokenPricing,
}

impl ReviewPipeline {
    pub fn new(provider: Arc<dyn AnalysisProvider>, config: &PipelineConfig) -> Self {
        Self {
            planner: ContextBudgetPlanner::new(),
            merger: ResultMerger::new(),
            retry: RetryExecutor::new(config.retry.clone()),
            provider,
            cost_sink: None,
            budget_tokens: config.budget.max_tokens_per_chunk,
            cost_ceiling_usd: config.cost.ceiling_usd,
            pricing: config.cost.pricing.clone(),
        }
    }

    pub fn with_cost_sink(mut self, sink: Arc<dyn CostSink>) -> Self {
        self.cost_sink = Some(sink);
        self
    }

    /// Per-operation retry stats, for inspection.
    pub fn retry_stats(&self) -> &RetryExecutor {
        &self.retry
    }

    /// Execute one review request end to end.
    pub async fn run(
        &self,
        job_id: &str,
        payload: &ReviewJobPayload,
    ) -> Result<Review, PipelineError> {
        let plan = self.planner.plan(
            &payload.changes,
            &payload.findings,
            self.budget_tokens,
            &payload.force_include,
        );
        info!(
            job = job_id,
            chunks = plan.summary.chunk_count,
            strategy = plan.summary.strategy.as_label(),
            estimated_tokens = plan.summary.total_estimated_tokens,
            "review plan built"
        );
        if plan.chunks.is_empty() {
            return Ok(empty_review());
        }

        let mut tracker = CostTracker::with_pricing(self.cost_ceiling_usd, self.pricing.clone());
        let mut partials: Vec<Review> = Vec::with_capacity(plan.chunks.len());
        let mut failures: Vec<String> = Vec::new();
        let mut truncated = false;

        for chunk in &plan.chunks {
            let decision = tracker.check();
            if !decision.should_continue {
                info!(
                    job = job_id,
                    chunk = %chunk.id,
                    reason = %decision.reason,
                    "stopping chunk dispatch"
                );
                truncated = true;
                break;
            }

            let request = ChunkRequest {
                pull_request: payload.pull_request.clone(),
                changes: chunk.changes.clone(),
                findings: chunk.findings.clone(),
                options: payload.options.clone(),
            };
            let operation = format!("analyze:{}", chunk.id);
            let provider = self.provider.clone();
            let outcome = self
                .retry
                .execute(&operation, move || {
                    let provider = provider.clone();
                    let request = request.clone();
                    async move {
                        let raw = provider.analyze(&request).await?;
                        validate_review(raw)
                    }
                })
                .await;

            match outcome {
                Ok(review) => {
                    tracker.record_usage(&review.usage);
                    partials.push(review);
                }
                Err(err) => {
                    warn!(
                        job = job_id,
                        chunk = %chunk.id,
                        error = %err,
                        "dropping chunk after retries"
                    );
                    failures.push(format!("{}: {err}", chunk.id));
                }
            }
        }

        if partials.is_empty() {
            return Err(PipelineError::AllChunksFailed {
                total: plan.summary.chunk_count,
                details: failures.join("; "),
            });
        }

        let mut review = self.merger.merge(partials)?;
        review.truncated = review.truncated || truncated;

        let spent = tracker.spent();
        review.usage.total_tokens = spent.total_tokens;
        review.usage.cost_usd = spent.total_cost_usd;

        if let Some(sink) = &self.cost_sink {
            let sink = sink.clone();
            let record_job_id = job_id.to_string();
            tokio::spawn(async move {
                sink.record_run(&record_job_id, &spent).await;
            });
        }
        Ok(review)
    }
}

/// Trivial approve review for an empty change set.
fn empty_review() -> Review {
    Review {
        summary: ReviewSummary {
            verdict: Verdict::Approve,
            confidence: 1.0,
            message: "no changes to analyze".to_string(),
        },
        comments: Vec::new(),
        suggestions: Vec::new(),
        metrics: ReviewMetrics::default(),
        usage: UsageTotals::default(),
        truncated: false,
    }
}

#[async_trait]
impl JobProcessor for ReviewPipeline {
    async fn process(&self, job: &Job) -> Result<serde_json::Value, PipelineError> {
        let payload: ReviewJobPayload = serde_json::from_value(job.payload.clone())
            .map_err(|err| PipelineError::Configuration(format!("invalid review payload: {err}")))?;
        let review = self.run(&job.id, &payload).await?;
        serde_json::to_value(&review).map_err(|err| PipelineError::Processor(err.to_string()))
    }
}
