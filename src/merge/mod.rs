//! Combines per-chunk analysis results into one coherent review.
//!
//! Merging preserves chunk dispatch order for comments and suggestions,
//! folds verdicts under the fixed dominance order
//! `request-changes > comment > approve`, averages confidence, sums the
//! countable metrics and usage, and takes the worst estimated impact.

use crate::error::PipelineError;
use crate::review::types::{Review, ReviewMetrics, ReviewSummary, UsageTotals, Verdict};

/// Merges chunk-scoped reviews, preserving ordering and severity semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultMerger;

impl ResultMerger {
    pub fn new() -> Self {
        Self
    }

    /// Merge reviews in chunk dispatch order.
    ///
    /// Zero inputs is an error; a single input is returned unchanged.
    pub fn merge(&self, reviews: Vec<Review>) -> Result<Review, PipelineError> {
        if reviews.is_empty() {
            return Err(PipelineError::EmptyMerge);
        }
        if reviews.len() == 1 {
            return Ok(reviews.into_iter().next().expect("len checked"));
        }

        let count = reviews.len();
        let mut verdict = Verdict::Approve;
        let mut confidence_sum = 0.0f32;
        let mut comments = Vec::new();
        let mut suggestions = Vec::new();
        let mut metrics = ReviewMetrics::default();
        let mut usage = UsageTotals::default();
        let mut truncated = false;

        for review in reviews {
            verdict = verdict.dominant(review.summary.verdict);
            confidence_sum += review.summary.confidence;
            comments.extend(review.comments);
            suggestions.extend(review.suggestions);
            metrics.issues_found += review.metrics.issues_found;
            metrics.critical_issues += review.metrics.critical_issues;
            metrics.improvements += review.metrics.improvements;
            metrics.estimated_impact = metrics
                .estimated_impact
                .worst(review.metrics.estimated_impact);
            usage.add(&review.usage);
            truncated |= review.truncated;
        }

        Ok(Review {
            summary: ReviewSummary {
                verdict,
                confidence: confidence_sum / count as f32,
                message: format!("merged review of {count} analysis chunks"),
            },
            comments,
            suggestions,
            metrics,
            usage,
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::types::{ImpactLevel, ReviewComment, Severity};

    fn review(verdict: Verdict, confidence: f32) -> Review {
        Review {
            summary: ReviewSummary {
                verdict,
                confidence,
                message: "chunk review".to_string(),
            },
            comments: Vec::new(),
            suggestions: Vec::new(),
            metrics: ReviewMetrics::default(),
            usage: UsageTotals::default(),
            truncated: false,
        }
    }

    #[test]
    fn test_empty_merge_is_an_error() {
        let merger = ResultMerger::new();
        assert!(matches!(
            merger.merge(Vec::new()),
            Err(PipelineError::EmptyMerge)
        ));
    }

    #[test]
    fn test_single_review_returned_unchanged() {
        let merger = ResultMerger::new();
        let mut single = review(Verdict::Comment, 0.8);
        single.truncated = true;
        single.metrics.issues_found = 4;
        let merged = merger.merge(vec![single]).unwrap();
        assert_eq!(merged.summary.verdict, Verdict::Comment);
        assert_eq!(merged.summary.message, "chunk review");
        assert_eq!(merged.metrics.issues_found, 4);
        assert!(merged.truncated);
    }

    #[test]
    fn test_verdict_dominance_in_any_permutation() {
        let merger = ResultMerger::new();
        let verdicts = [Verdict::Comment, Verdict::Approve, Verdict::RequestChanges];
        // All rotations of the three verdicts must merge to request-changes.
        for rotation in 0..verdicts.len() {
            let reviews: Vec<Review> = (0..verdicts.len())
                .map(|i| review(verdicts[(i + rotation) % verdicts.len()], 0.5))
                .collect();
            let merged = merger.merge(reviews).unwrap();
            assert_eq!(merged.summary.verdict, Verdict::RequestChanges);
        }
    }

    #[test]
    fn test_comment_dominates_approve() {
        let merger = ResultMerger::new();
        let merged = merger
            .merge(vec![review(Verdict::Approve, 0.9), review(Verdict::Comment, 0.7)])
            .unwrap();
        assert_eq!(merged.summary.verdict, Verdict::Comment);
    }

    #[test]
    fn test_confidence_is_arithmetic_mean() {
        let merger = ResultMerger::new();
        let merged = merger
            .merge(vec![
                review(Verdict::Approve, 0.6),
                review(Verdict::Approve, 0.8),
                review(Verdict::Approve, 1.0),
            ])
            .unwrap();
        assert!((merged.summary.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_comments_preserve_dispatch_order() {
        let merger = ResultMerger::new();
        let mut first = review(Verdict::Comment, 0.5);
        first.comments.push(ReviewComment {
            file: "a.rs".to_string(),
            line: 1,
            body: "from chunk one".to_string(),
            severity: Some(Severity::Medium),
        });
        let mut second = review(Verdict::Comment, 0.5);
        second.comments.push(ReviewComment {
            file: "b.rs".to_string(),
            line: 2,
            body: "from chunk two".to_string(),
            severity: None,
        });
        let merged = merger.merge(vec![first, second]).unwrap();
        assert_eq!(merged.comments.len(), 2);
        assert_eq!(merged.comments[0].body, "from chunk one");
        assert_eq!(merged.comments[1].body, "from chunk two");
    }

    #[test]
    fn test_metrics_sum_except_impact_takes_worst() {
        let merger = ResultMerger::new();
        let mut first = review(Verdict::Comment, 0.5);
        first.metrics = ReviewMetrics {
            issues_found: 3,
            critical_issues: 1,
            improvements: 2,
            estimated_impact: ImpactLevel::High,
        };
        let mut second = review(Verdict::Comment, 0.5);
        second.metrics = ReviewMetrics {
            issues_found: 2,
            critical_issues: 0,
            improvements: 5,
            estimated_impact: ImpactLevel::Low,
        };
        let merged = merger.merge(vec![first, second]).unwrap();
        assert_eq!(merged.metrics.issues_found, 5);
        assert_eq!(merged.metrics.critical_issues, 1);
        assert_eq!(merged.metrics.improvements, 7);
        assert_eq!(merged.metrics.estimated_impact, ImpactLevel::High);
    }

    #[test]
    fn test_usage_fields_are_summed() {
        let merger = ResultMerger::new();
        let mut first = review(Verdict::Approve, 0.5);
        first.usage = UsageTotals {
            prompt_tokens: 1_000,
            completion_tokens: 200,
            total_tokens: 1_200,
            cost_usd: 0.02,
        };
        let mut second = review(Verdict::Approve, 0.5);
        second.usage = UsageTotals {
            prompt_tokens: 500,
            completion_tokens: 100,
            total_tokens: 600,
            cost_usd: 0.01,
        };
        let merged = merger.merge(vec![first, second]).unwrap();
        assert_eq!(merged.usage.total_tokens, 1_800);
        assert!((merged.usage.cost_usd - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_truncated_propagates() {
        let merger = ResultMerger::new();
        let mut second = review(Verdict::Approve, 0.5);
        second.truncated = true;
        let merged = merger
            .merge(vec![review(Verdict::Approve, 0.5), second])
            .unwrap();
        assert!(merged.truncated);
    }
}
