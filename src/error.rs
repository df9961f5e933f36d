//! Error taxonomy for the analysis pipeline.
//!
//! Errors fall into three behavioral classes: fatal errors that propagate to
//! the caller untouched, transient errors the retry machinery may attempt
//! again, and degraded errors that cost one unit of work while the
//! surrounding job continues. The scheduler and the retry executor both key
//! off [`ErrorCategory`] rather than matching individual variants.

use std::time::Duration;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// All failure modes surfaced by the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid policy or options at setup time. Rejected before any work
    /// starts.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The queue's backing store or transport is unreachable.
    #[error("queue backend unavailable: {0}")]
    QueueBackend(String),

    /// A job's processor failed.
    #[error("processor failed: {0}")]
    Processor(String),

    /// Cumulative spend reached the configured ceiling for this run.
    #[error("cost ceiling reached: spent ${spent:.4} of ${ceiling:.4}")]
    CostLimitExceeded { spent: f64, ceiling: f64 },

    /// The analysis collaborator returned data not matching the review
    /// contract.
    #[error("analysis response did not match the review schema: {0}")]
    SchemaValidation(String),

    /// The analysis collaborator rejected the call due to rate limiting.
    /// `retry_after`, when supplied, overrides the computed backoff delay.
    #[error("rate limited by the analysis service")]
    RateLimited { retry_after: Option<Duration> },

    /// A named operation exhausted its retry budget. Carries the last
    /// underlying error.
    #[error("operation '{operation}' failed after {attempts} attempts: {source}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<PipelineError>,
    },

    /// Every chunk of a run failed; there is nothing to merge.
    #[error("all {total} chunks failed: {details}")]
    AllChunksFailed { total: usize, details: String },

    /// `merge` was called with no chunk reviews.
    #[error("no chunk reviews to merge")]
    EmptyMerge,

    /// Job execution exceeded its configured timeout.
    #[error("job timed out after {0:?}")]
    JobTimeout(Duration),

    /// A job ID that does not exist in the scheduler.
    #[error("unknown job: {0}")]
    UnknownJob(String),

    /// A job was dequeued for a type with no registered processor.
    #[error("no processor registered for job type '{0}'")]
    NoProcessor(String),
}

/// Behavioral classification driving retry and propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Propagated to the caller untouched; retrying cannot help.
    Fatal,
    /// Worth another attempt after a backoff delay.
    Transient,
    /// One unit of work is lost, but the surrounding job continues.
    Degraded,
}

impl PipelineError {
    /// Classify this error for retry and propagation decisions.
    pub fn classify(&self) -> ErrorCategory {
        match self {
            PipelineError::Configuration(_)
            | PipelineError::QueueBackend(_)
            | PipelineError::UnknownJob(_)
            | PipelineError::NoProcessor(_) => ErrorCategory::Fatal,
            PipelineError::Processor(_)
            | PipelineError::RateLimited { .. }
            | PipelineError::SchemaValidation(_)
            | PipelineError::JobTimeout(_) => ErrorCategory::Transient,
            PipelineError::CostLimitExceeded { .. }
            | PipelineError::RetryExhausted { .. }
            | PipelineError::AllChunksFailed { .. }
            | PipelineError::EmptyMerge => ErrorCategory::Degraded,
        }
    }

    /// Whether the retry executor should attempt this operation again.
    pub fn is_retryable(&self) -> bool {
        self.classify() == ErrorCategory::Transient
    }

    /// Whether this error must propagate to the caller unmodified.
    pub fn is_fatal(&self) -> bool {
        self.classify() == ErrorCategory::Fatal
    }

    /// Delay suggested by the failure itself, if it carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PipelineError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Stable label for an error category, used in logs and metrics.
pub fn error_category_label(category: &ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Fatal => "fatal",
        ErrorCategory::Transient => "transient",
        ErrorCategory::Degraded => "degraded",
    }
}
