//! Review-domain data model.
//!
//! Everything here is wire-shaped: constructed by the upstream diff/finding
//! provider or the downstream analysis collaborator, serialized with serde,
//! and immutable once built. The pipeline only reads these types; the one
//! exception is [`types::Review`], which the merger assembles from per-chunk
//! results.

pub mod types;

pub use types::{
    AnalysisOptions, ChangeType, ChunkRequest, CodeChange, DiffHunk, Finding, FindingKind,
    ImpactLevel, Location, PullRequestMeta, Review, ReviewComment, ReviewJobPayload,
    ReviewMetrics, ReviewSummary, Severity, Suggestion, UsageTotals, Verdict,
};
