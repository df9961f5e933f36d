//! revpipe: budget-aware asynchronous analysis pipeline for automated code
//! review.
//!
//! The crate ingests a review request's code changes and findings, fits them
//! within the token budget of a downstream analysis call, and executes that
//! analysis asynchronously under a hard cost ceiling:
//!
//! - [`budget`]: deterministic token estimation and budget-aware chunk
//!   planning with severity/security priority and forced inclusion
//! - [`cost`]: per-run spend tracking and the dispatch cost gate
//! - [`retry`]: bounded exponential backoff with jitter around collaborator
//!   calls
//! - [`merge`]: combining per-chunk results under fixed verdict dominance
//! - [`queue`]: typed job queues with per-type concurrency, backoff requeue,
//!   and dead-lettering
//! - [`pipeline`]: the processor wiring it all together against an
//!   [`pipeline::AnalysisProvider`]
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use revpipe::{JobScheduler, PipelineConfig, ReviewPipeline};
//! use revpipe::queue::{JobOptions, JobType};
//!
//! let config = PipelineConfig::from_file("revpipe.toml")?;
//! let scheduler = JobScheduler::new(config.scheduler.clone())?;
//! let pipeline = Arc::new(ReviewPipeline::new(provider, &config));
//! scheduler.register_processor(JobType::PrAnalysis, pipeline).await;
//!
//! let handle = scheduler
//!     .add_job(JobType::PrAnalysis, payload, JobOptions::default())
//!     .await?;
//! ```

pub mod budget;
pub mod config;
pub mod cost;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod review;
pub mod telemetry;

pub use config::PipelineConfig;
pub use error::{ErrorCategory, PipelineError};
pub use pipeline::{AnalysisProvider, CostSink, ReviewPipeline};
pub use queue::{JobProcessor, JobScheduler};
pub use review::types::Review;
