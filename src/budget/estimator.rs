//! Token estimation for planner input.
//!
//! The downstream analysis call bounds request size in tokens, but the exact
//! tokenizer is model-specific, so estimation is character-density based with
//! a per-content-type multiplier. The contract the planner relies on:
//! deterministic, pure, no I/O, and cheap enough to call once per item per
//! plan.

use serde::{Deserialize, Serialize};

use crate::review::types::{CodeChange, Finding};

/// Content classes with distinct token density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Code,
    Diff,
    Json,
    Minified,
}

impl ContentType {
    /// Tokens per character for this content class.
    fn density(&self) -> f64 {
        match self {
            ContentType::Code => 0.30,
            ContentType::Diff => 0.32,
            ContentType::Json => 0.35,
            ContentType::Minified => 0.40,
        }
    }

    /// Heuristic detection when the caller does not know the content class.
    ///
    /// Checked in order: very long lines with few breaks, unified-diff
    /// markers, a leading JSON bracket, otherwise plain code.
    pub fn detect(content: &str) -> Self {
        if content.is_empty() {
            return ContentType::Code;
        }
        let line_count = content.lines().count().max(1);
        if content.len() / line_count > 300 {
            return ContentType::Minified;
        }
        if content.contains("@@") && (content.contains("+++") || content.contains("---")) {
            return ContentType::Diff;
        }
        let trimmed = content.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            return ContentType::Json;
        }
        ContentType::Code
    }
}

/// Upper bound on the density adjustment factor.
const MAX_DENSITY_ADJUSTMENT: f64 = 1.3;

/// Average line length above which content counts as dense.
const DENSE_LINE_LENGTH: f64 = 120.0;

/// Fixed envelope overhead of one collaborator request, in tokens.
pub const REQUEST_OVERHEAD_TOKENS: u64 = 300;

/// Framing overhead per change in a request (path, markers), in tokens.
const CHANGE_OVERHEAD_TOKENS: u64 = 20;

/// Rough serialized size of one finding in a request, in tokens.
const FINDING_BASE_TOKENS: u64 = 40;

/// Estimates token counts from text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimator;

impl TokenEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Estimate tokens for `content`, detecting the content type when not
    /// supplied. Returns 0 for empty content.
    pub fn estimate(&self, content: &str, content_type: Option<ContentType>) -> u64 {
        if content.is_empty() {
            return 0;
        }
        let ty = content_type.unwrap_or_else(|| ContentType::detect(content));
        let base = content.len() as f64 * ty.density();
        (base * self.density_adjustment(content)).ceil() as u64
    }

    /// Tokens a change contributes to a chunk request.
    pub fn change_tokens(&self, change: &CodeChange) -> u64 {
        let text = change.patch_text();
        // Hunks are always diff-shaped; full content gets auto-detected.
        let ty = if change.content.is_none() && !change.hunks.is_empty() {
            Some(ContentType::Diff)
        } else {
            None
        };
        self.estimate(&text, ty) + CHANGE_OVERHEAD_TOKENS
    }

    /// Tokens a finding contributes to a chunk request.
    pub fn finding_tokens(&self, finding: &Finding) -> u64 {
        FINDING_BASE_TOKENS + self.estimate(&finding.file, Some(ContentType::Code))
    }

    /// Adjustment in `[1.0, 1.3]` computed from average line length and the
    /// proportion of non-empty lines.
    fn density_adjustment(&self, content: &str) -> f64 {
        let line_count = content.lines().count();
        if line_count == 0 {
            return 1.0;
        }
        let avg_line_len = content.len() as f64 / line_count as f64;
        let non_empty = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .count() as f64
            / line_count as f64;

        let mut adjustment: f64 = 1.0;
        if avg_line_len > DENSE_LINE_LENGTH {
            adjustment += 0.15;
        }
        if non_empty > 0.9 {
            adjustment += 0.10;
        }
        adjustment.min(MAX_DENSITY_ADJUSTMENT)
    }
}
