//! Chunking strategy selection.
//!
//! The planner supports a closed set of grouping strategies behind one
//! packing interface. Selection is a pure function of aggregate input
//! signals, so identical inputs always plan the same way.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::review::types::{CodeChange, Finding, Severity};

/// How the planner groups changes before packing them into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkStrategy {
    /// Files carrying critical/high findings grouped first, then the rest.
    SeverityBased,
    /// One group per top-level module directory.
    ModuleBased,
    /// Critical-first group, then module groups for the remainder.
    Hybrid,
    /// Single priority-ordered greedy pass.
    SizeBased,
}

impl ChunkStrategy {
    pub fn as_label(&self) -> &'static str {
        match self {
            ChunkStrategy::SeverityBased => "severity",
            ChunkStrategy::ModuleBased => "module",
            ChunkStrategy::Hybrid => "hybrid",
            ChunkStrategy::SizeBased => "size",
        }
    }
}

/// Critical/high findings at or above this count force severity grouping.
const SEVERITY_FOCUS_FINDINGS: usize = 5;

/// Distinct top-level modules at or above this count force module grouping.
const MANY_MODULES: usize = 4;

/// Changes above this count force hybrid grouping.
const LARGE_CHANGE_SET: usize = 50;

/// Aggregate shape of one plan input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSignals {
    pub change_count: usize,
    pub finding_count: usize,
    pub critical_high_findings: usize,
    pub module_count: usize,
}

impl PlanSignals {
    /// Gather signals from raw plan input.
    pub fn gather(changes: &[CodeChange], findings: &[Finding]) -> Self {
        let modules: HashSet<&str> = changes.iter().map(|c| c.top_level_module()).collect();
        let critical_high = findings
            .iter()
            .filter(|f| f.severity >= Severity::High)
            .count();
        Self {
            change_count: changes.len(),
            finding_count: findings.len(),
            critical_high_findings: critical_high,
            module_count: modules.len(),
        }
    }

    /// Whether critical/high findings dominate the change set: either an
    /// absolute pile-up, or at least 30% as many as there are changes.
    fn severity_concentrated(&self) -> bool {
        if self.critical_high_findings == 0 {
            return false;
        }
        self.critical_high_findings >= SEVERITY_FOCUS_FINDINGS
            || self.critical_high_findings * 10 >= self.change_count * 3
    }
}

/// Pick the grouping strategy for a plan input.
pub fn choose_strategy(signals: &PlanSignals) -> ChunkStrategy {
    if signals.change_count == 0 {
        return ChunkStrategy::SizeBased;
    }
    if signals.severity_concentrated() {
        return ChunkStrategy::SeverityBased;
    }
    if signals.module_count >= MANY_MODULES {
        return ChunkStrategy::ModuleBased;
    }
    if signals.change_count > LARGE_CHANGE_SET {
        return ChunkStrategy::Hybrid;
    }
    ChunkStrategy::SizeBased
}
