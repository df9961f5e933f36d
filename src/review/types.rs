//! Wire types shared between the pipeline and its collaborators.

use serde::{Deserialize, Serialize};

/// Severity of a finding, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Base priority weight contributed to a change carrying this finding.
    pub fn weight(&self) -> u32 {
        match self {
            Severity::Critical => 100,
            Severity::High => 70,
            Severity::Medium => 40,
            Severity::Low => 20,
        }
    }
}

/// How a file was touched by the change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

/// One contiguous region of a unified diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffHunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub patch: String,
}

/// A single changed file, as supplied by the diff provider.
///
/// Immutable once constructed. Findings reference a change by file path; the
/// relation is a lookup, not ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeChange {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub change_type: ChangeType,
    #[serde(default)]
    pub hunks: Vec<DiffHunk>,
    /// Full post-change file content, when the provider supplies it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl CodeChange {
    pub fn new(file: impl Into<String>, change_type: ChangeType) -> Self {
        Self {
            file: file.into(),
            language: None,
            change_type,
            hunks: Vec::new(),
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_hunks(mut self, hunks: Vec<DiffHunk>) -> Self {
        self.hunks = hunks;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// The text this change contributes to an analysis request: full content
    /// when present, otherwise the concatenated hunk patches.
    pub fn patch_text(&self) -> String {
        if let Some(content) = &self.content {
            return content.clone();
        }
        let mut out = String::new();
        for hunk in &self.hunks {
            out.push_str(&hunk.patch);
            if !hunk.patch.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }

    /// First path segment, used for module grouping.
    pub fn top_level_module(&self) -> &str {
        self.file.split('/').next().unwrap_or(&self.file)
    }
}

/// Category of a static-analysis finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    Security,
    Bug,
    Performance,
    Style,
    Maintainability,
}

/// Position of a finding inside its file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

/// A single static-analysis finding tied to a file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub kind: FindingKind,
    pub severity: Severity,
    pub file: String,
    #[serde(default)]
    pub location: Location,
    pub confidence: f32,
    /// Which analyzer produced this finding.
    pub source: String,
}

impl Finding {
    pub fn new(
        id: impl Into<String>,
        kind: FindingKind,
        severity: Severity,
        file: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            severity,
            file: file.into(),
            location: Location::default(),
            confidence: 1.0,
            source: "static-analysis".to_string(),
        }
    }

    /// Severity-and-kind weighted priority score. Security findings outrank
    /// non-security findings of equal severity.
    pub fn priority_score(&self) -> u32 {
        let base = self.severity.weight();
        if self.kind == FindingKind::Security {
            base * 3 / 2
        } else {
            base
        }
    }
}

/// Categorical review outcome with a fixed dominance order:
/// `request-changes > comment > approve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Approve,
    Comment,
    RequestChanges,
}

impl Verdict {
    fn rank(&self) -> u8 {
        match self {
            Verdict::Approve => 0,
            Verdict::Comment => 1,
            Verdict::RequestChanges => 2,
        }
    }

    /// Pairwise-dominant verdict of `self` and `other`.
    pub fn dominant(self, other: Verdict) -> Verdict {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

/// Estimated blast radius of the change set, as judged per chunk.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

impl Default for ImpactLevel {
    fn default() -> Self {
        Self::Low
    }
}

impl ImpactLevel {
    /// The worse of two impact levels.
    pub fn worst(self, other: ImpactLevel) -> ImpactLevel {
        self.max(other)
    }
}

/// Headline of a review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub verdict: Verdict,
    /// In `[0.0, 1.0]`; validated at the collaborator boundary.
    pub confidence: f32,
    pub message: String,
}

/// One inline review comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewComment {
    pub file: String,
    pub line: u32,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

/// A concrete improvement the analysis proposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub file: String,
    pub line: u32,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

/// Aggregate counters attached to a review.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReviewMetrics {
    pub issues_found: u32,
    pub critical_issues: u32,
    pub improvements: u32,
    #[serde(default)]
    pub estimated_impact: ImpactLevel,
}

/// Token and cost accounting for one or more analysis invocations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

impl UsageTotals {
    /// Accumulate another usage record into this one.
    pub fn add(&mut self, other: &UsageTotals) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.cost_usd += other.cost_usd;
    }
}

/// The final product of one analysis job. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub summary: ReviewSummary,
    #[serde(default)]
    pub comments: Vec<ReviewComment>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    #[serde(default)]
    pub metrics: ReviewMetrics,
    #[serde(default)]
    pub usage: UsageTotals,
    /// Set when a cost-ceiling cutoff stopped dispatch before every planned
    /// chunk ran. The review then reflects only the chunks that completed.
    #[serde(default)]
    pub truncated: bool,
}

/// Metadata of the pull request under review.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequestMeta {
    pub repository: String,
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub head_sha: String,
}

/// Caller-supplied knobs forwarded with each analysis invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisOptions {
    #[serde(default)]
    pub focus_areas: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_filter: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_suggestions: Option<u32>,
}

/// Chunk-scoped request sent to the analysis collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRequest {
    pub pull_request: PullRequestMeta,
    pub changes: Vec<CodeChange>,
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub options: AnalysisOptions,
}

/// Payload of a `pr-analysis` / `code-analysis` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewJobPayload {
    pub pull_request: PullRequestMeta,
    pub changes: Vec<CodeChange>,
    #[serde(default)]
    pub findings: Vec<Finding>,
    /// Files that must land in a chunk regardless of token overflow.
    #[serde(default)]
    pub force_include: Vec<String>,
    #[serde(default)]
    pub options: AnalysisOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_dominance() {
        assert_eq!(
            Verdict::Approve.dominant(Verdict::RequestChanges),
            Verdict::RequestChanges
        );
        assert_eq!(Verdict::Comment.dominant(Verdict::Approve), Verdict::Comment);
        assert_eq!(Verdict::Approve.dominant(Verdict::Approve), Verdict::Approve);
    }

    #[test]
    fn test_verdict_serializes_kebab_case() {
        let json = serde_json::to_string(&Verdict::RequestChanges).unwrap();
        assert_eq!(json, "\"request-changes\"");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_security_finding_outranks_equal_severity() {
        let security = Finding::new("f1", FindingKind::Security, Severity::High, "auth.rs");
        let bug = Finding::new("f2", FindingKind::Bug, Severity::High, "main.rs");
        assert!(security.priority_score() > bug.priority_score());
    }

    #[test]
    fn test_impact_worst() {
        assert_eq!(
            ImpactLevel::Low.worst(ImpactLevel::High),
            ImpactLevel::High
        );
        assert_eq!(
            ImpactLevel::Medium.worst(ImpactLevel::Low),
            ImpactLevel::Medium
        );
    }

    #[test]
    fn test_usage_totals_add() {
        let mut usage = UsageTotals {
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 150,
            cost_usd: 0.01,
        };
        usage.add(&UsageTotals {
            prompt_tokens: 200,
            completion_tokens: 100,
            total_tokens: 300,
            cost_usd: 0.02,
        });
        assert_eq!(usage.prompt_tokens, 300);
        assert_eq!(usage.total_tokens, 450);
        assert!((usage.cost_usd - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_patch_text_prefers_content() {
        let change = CodeChange::new("src/lib.rs", ChangeType::Modified)
            .with_content("fn main() {}")
            .with_hunks(vec![DiffHunk {
                old_start: 1,
                old_lines: 1,
                new_start: 1,
                new_lines: 1,
                patch: "@@ -1 +1 @@".to_string(),
            }]);
        assert_eq!(change.patch_text(), "fn main() {}");
    }

    #[test]
    fn test_top_level_module() {
        let change = CodeChange::new("src/api/handler.rs", ChangeType::Modified);
        assert_eq!(change.top_level_module(), "src");
        let flat = CodeChange::new("README.md", ChangeType::Modified);
        assert_eq!(flat.top_level_module(), "README.md");
    }

    #[test]
    fn test_review_deserializes_with_defaults() {
        let raw = serde_json::json!({
            "summary": {
                "verdict": "approve",
                "confidence": 0.9,
                "message": "looks good"
            }
        });
        let review: Review = serde_json::from_value(raw).unwrap();
        assert!(review.comments.is_empty());
        assert!(!review.truncated);
        assert_eq!(review.metrics.estimated_impact, ImpactLevel::Low);
    }
}
