//! Budget-aware partitioning of changes and findings into chunks.
//!
//! The planner turns a heterogeneous change set into an ordered list of
//! [`Chunk`]s, each within the token budget of one downstream analysis call.
//! Changes are scored by the findings that reference them and by
//! security-sensitive path patterns, grouped by a strategy chosen from the
//! aggregate input shape, and packed first-fit greedy in descending priority
//! order. Force-included files are packed even when they overflow the budget
//! (a soft violation, logged).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::budget::estimator::TokenEstimator;
use crate::budget::strategy::{choose_strategy, ChunkStrategy, PlanSignals};
use crate::review::types::{CodeChange, Finding, Severity};

/// Priority assigned to force-included files; above any computable score.
pub const FORCE_PRIORITY: u32 = 1_000;

/// Baseline priority for changes with no findings and no pattern match.
const CONTEXT_PRIORITY: u32 = 10;

/// Floor priority for files matching security-sensitive name patterns.
const SECURITY_PATTERN_PRIORITY: u32 = 80;

/// Floor priority for files on critical paths.
const CRITICAL_PATH_PRIORITY: u32 = 60;

static SECURITY_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(auth|token|secret|credential|session|jwt|oauth)")
        .expect("SECURITY_FILE_RE should compile")
});

static CRITICAL_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(config|database|api|route|handler|middleware)")
        .expect("CRITICAL_PATH_RE should compile")
});

/// A budget-bounded partition of changes and findings, dispatched as one
/// analysis invocation. Created per run, never persisted.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub priority: u32,
    pub changes: Vec<CodeChange>,
    pub findings: Vec<Finding>,
    pub token_estimate: u64,
    pub description: String,
}

/// Observability summary emitted alongside the chunks.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PlanSummary {
    pub change_count: usize,
    pub finding_count: usize,
    pub critical_findings: usize,
    pub total_estimated_tokens: u64,
    pub strategy: ChunkStrategy,
    pub chunk_count: usize,
}

/// The planner's output: ordered chunks plus the plan summary.
#[derive(Debug, Clone)]
pub struct ContextPlan {
    pub chunks: Vec<Chunk>,
    pub summary: PlanSummary,
}

/// One change plus everything the packer needs to place it.
#[derive(Debug, Clone)]
struct PlanItem {
    change: CodeChange,
    findings: Vec<Finding>,
    priority: u32,
    tokens: u64,
    forced: bool,
}

impl PlanItem {
    fn has_severe_finding(&self) -> bool {
        self.findings.iter().any(|f| f.severity >= Severity::High)
    }
}

/// In-progress chunk during packing.
#[derive(Debug, Default)]
struct OpenChunk {
    changes: Vec<CodeChange>,
    findings: Vec<Finding>,
    tokens: u64,
    priority: u32,
}

impl OpenChunk {
    fn push(&mut self, item: PlanItem) {
        self.tokens += item.tokens;
        self.priority = self.priority.max(item.priority);
        self.changes.push(item.change);
        self.findings.extend(item.findings);
    }
}

/// Partitions changes and findings into budget-bounded chunks.
#[derive(Debug, Clone, Default)]
pub struct ContextBudgetPlanner {
    estimator: TokenEstimator,
}

impl ContextBudgetPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_estimator(estimator: TokenEstimator) -> Self {
        Self { estimator }
    }

    /// Partition `changes` and their `findings` into chunks of at most
    /// `budget` estimated tokens. Files named in `force_include` are packed
    /// exactly once regardless of overflow.
    ///
    /// Deterministic: identical inputs produce an identical chunk
    /// assignment. Empty input yields zero chunks.
    pub fn plan(
        &self,
        changes: &[CodeChange],
        findings: &[Finding],
        budget: u64,
        force_include: &[String],
    ) -> ContextPlan {
        let signals = PlanSignals::gather(changes, findings);
        let strategy = choose_strategy(&signals);

        let forced: HashSet<&str> = force_include.iter().map(String::as_str).collect();
        let mut findings_by_file: HashMap<&str, Vec<Finding>> = HashMap::new();
        for finding in findings {
            findings_by_file
                .entry(finding.file.as_str())
                .or_default()
                .push(finding.clone());
        }

        let mut items: Vec<PlanItem> = Vec::with_capacity(changes.len());
        for change in changes {
            let file_findings = findings_by_file
                .remove(change.file.as_str())
                .unwrap_or_default();
            let is_forced = forced.contains(change.file.as_str());
            let priority = self.change_priority(change, &file_findings, is_forced);
            let tokens = self.estimator.change_tokens(change)
                + file_findings
                    .iter()
                    .map(|f| self.estimator.finding_tokens(f))
                    .sum::<u64>();
            items.push(PlanItem {
                change: change.clone(),
                findings: file_findings,
                priority,
                tokens,
                forced: is_forced,
            });
        }
        if !findings_by_file.is_empty() {
            debug!(
                orphaned = findings_by_file.len(),
                "findings reference files outside the change set"
            );
        }

        let mut chunks = Vec::new();
        match strategy {
            ChunkStrategy::SizeBased => {
                self.pack_group("changes", items, budget, &mut chunks);
            }
            ChunkStrategy::SeverityBased => {
                let (critical, rest): (Vec<_>, Vec<_>) =
                    items.into_iter().partition(PlanItem::has_severe_finding);
                self.pack_group("critical findings", critical, budget, &mut chunks);
                self.pack_group("remaining changes", rest, budget, &mut chunks);
            }
            ChunkStrategy::ModuleBased => {
                for (module, group) in group_by_module(items) {
                    self.pack_group(&format!("module {module}"), group, budget, &mut chunks);
                }
            }
            ChunkStrategy::Hybrid => {
                let (critical, rest): (Vec<_>, Vec<_>) =
                    items.into_iter().partition(PlanItem::has_severe_finding);
                self.pack_group("critical findings", critical, budget, &mut chunks);
                for (module, group) in group_by_module(rest) {
                    self.pack_group(&format!("module {module}"), group, budget, &mut chunks);
                }
            }
        }

        let summary = PlanSummary {
            change_count: signals.change_count,
            finding_count: signals.finding_count,
            critical_findings: findings
                .iter()
                .filter(|f| f.severity == Severity::Critical)
                .count(),
            total_estimated_tokens: chunks.iter().map(|c| c.token_estimate).sum(),
            strategy,
            chunk_count: chunks.len(),
        };
        debug!(
            chunks = summary.chunk_count,
            strategy = strategy.as_label(),
            tokens = summary.total_estimated_tokens,
            "context plan built"
        );
        ContextPlan { chunks, summary }
    }

    /// Priority for one change. Force-included files get [`FORCE_PRIORITY`];
    /// otherwise the best of the baseline, the strongest matching finding
    /// score, and the filename-pattern floors.
    fn change_priority(&self, change: &CodeChange, findings: &[Finding], forced: bool) -> u32 {
        if forced {
            return FORCE_PRIORITY;
        }
        let mut priority = CONTEXT_PRIORITY;
        for finding in findings {
            priority = priority.max(finding.priority_score());
        }
        if SECURITY_FILE_RE.is_match(&change.file) {
            priority = priority.max(SECURITY_PATTERN_PRIORITY);
        }
        if CRITICAL_PATH_RE.is_match(&change.file) {
            priority = priority.max(CRITICAL_PATH_PRIORITY);
        }
        priority
    }

    /// First-fit greedy packing of one group, appending finished chunks.
    ///
    /// Items are ordered by descending priority (file path breaks ties, so
    /// packing stays deterministic); forced items sort first by virtue of
    /// their priority and are inserted even when they overflow.
    fn pack_group(
        &self,
        label: &str,
        mut items: Vec<PlanItem>,
        budget: u64,
        chunks: &mut Vec<Chunk>,
    ) {
        if items.is_empty() {
            return;
        }
        items.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.change.file.cmp(&b.change.file))
        });

        let mut open = OpenChunk::default();
        for item in items {
            let overflows = open.tokens + item.tokens > budget;
            if overflows {
                if item.forced {
                    warn!(
                        file = %item.change.file,
                        "force-included change overflows the chunk budget"
                    );
                } else if open.changes.is_empty() {
                    warn!(
                        file = %item.change.file,
                        tokens = item.tokens,
                        budget,
                        "change alone exceeds the chunk budget"
                    );
                } else {
                    chunks.push(close_chunk(label, open, chunks.len()));
                    open = OpenChunk::default();
                }
            }
            open.push(item);
        }
        if !open.changes.is_empty() {
            chunks.push(close_chunk(label, open, chunks.len()));
        }
    }
}

fn close_chunk(label: &str, open: OpenChunk, index: usize) -> Chunk {
    Chunk {
        id: format!("chunk-{}", index + 1),
        priority: open.priority,
        description: format!(
            "{label} ({} changes, {} findings)",
            open.changes.len(),
            open.findings.len()
        ),
        token_estimate: open.tokens,
        changes: open.changes,
        findings: open.findings,
    }
}

/// Group items by top-level module, in stable alphabetical order.
fn group_by_module(items: Vec<PlanItem>) -> BTreeMap<String, Vec<PlanItem>> {
    let mut groups: BTreeMap<String, Vec<PlanItem>> = BTreeMap::new();
    for item in items {
        groups
            .entry(item.change.top_level_module().to_string())
            .or_default()
            .push(item);
    }
    groups
}
