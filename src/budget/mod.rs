//! Context budget planning.
//!
//! The downstream analysis call accepts a bounded number of tokens per
//! request, so a review's changes and findings must be partitioned before
//! dispatch. This module provides:
//! - **TokenEstimator**: deterministic token estimation from text
//! - **ChunkStrategy** / **choose_strategy**: closed strategy set selected
//!   from aggregate input signals
//! - **ContextBudgetPlanner**: priority scoring and first-fit greedy packing
//!   into budget-bounded chunks
//!
//! # Example
//!
//! ```ignore
//! use revpipe::budget::ContextBudgetPlanner;
//!
//! let planner = ContextBudgetPlanner::new();
//! let plan = planner.plan(&changes, &findings, 24_000, &[]);
//! for chunk in &plan.chunks {
//!     // dispatch chunk to the analysis collaborator
//! }
//! ```

mod estimator;
mod planner;
mod strategy;

pub use estimator::{ContentType, TokenEstimator, REQUEST_OVERHEAD_TOKENS};
pub use planner::{Chunk, ContextBudgetPlanner, ContextPlan, PlanSummary, FORCE_PRIORITY};
pub use strategy::{choose_strategy, ChunkStrategy, PlanSignals};
