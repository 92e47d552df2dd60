//! Input risk gate.
//!
//! Normalizes raw request text, scans it against the fixed rule catalog and
//! produces a [`RiskAssessment`] with an allow/review/block decision. Pure:
//! identical input always yields an identical assessment.

pub mod normalize;
pub mod rules;

use regex::Regex;
use serde::Serialize;

pub use normalize::clean_input;
pub use rules::{Finding, PatternRule, RuleCatalog, Severity, BENIGN_IMPORT_RULE};

/// Risk score at or above which input is blocked.
const BLOCK_THRESHOLD: u32 = 8;
/// Risk score at or above which input needs review.
const REVIEW_THRESHOLD: u32 = 3;

/// Default maximum length accepted by [`PromptGuard::allowlist_only`].
const DEFAULT_ALLOWLIST_MAX_LEN: usize = 2000;

/// Gate decision for a piece of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Review,
    Block,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Allow => write!(f, "allow"),
            Decision::Review => write!(f, "review"),
            Decision::Block => write!(f, "block"),
        }
    }
}

/// Result of analyzing one piece of raw input.
#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    /// Normalized input text.
    pub cleaned: String,
    /// One finding per matched rule, in catalog order.
    pub findings: Vec<Finding>,
    /// Weighted risk score.
    pub score: u32,
    /// Final decision, after the benign-import override.
    pub decision: Decision,
}

/// The input risk gate.
///
/// Holds the compiled rule catalog and the safe-character set; both are fixed
/// at construction and shared read-only across requests.
pub struct PromptGuard {
    catalog: RuleCatalog,
    allowlist_max_len: usize,
    safe_chars: Regex,
}

impl Default for PromptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptGuard {
    pub fn new() -> Self {
        Self::with_allowlist_cap(DEFAULT_ALLOWLIST_MAX_LEN)
    }

    /// Create a guard with a custom length cap for `allowlist_only`.
    pub fn with_allowlist_cap(allowlist_max_len: usize) -> Self {
        Self {
            catalog: RuleCatalog::default(),
            allowlist_max_len,
            safe_chars: Regex::new(
                r#"^[\n\t\r a-zA-Z0-9_.,:;!?()"'@#/$%&*+=<>\[\]{}|\\~`-]+$"#,
            )
            .expect("static safe-character pattern is valid"),
        }
    }

    /// Normalize and score raw input.
    ///
    /// The decision follows the weighted score, with one exception: when the
    /// findings consist of exactly one entry for the benign language-import
    /// rule, a Review decision is downgraded to Allow. Nothing else is ever
    /// downgraded.
    pub fn analyze(&self, raw: &str) -> RiskAssessment {
        let cleaned = clean_input(raw);
        let findings = self.catalog.scan(&cleaned);

        let score: u32 = findings
            .iter()
            .map(|f| f.severity.weight() * f.count as u32)
            .sum();

        let mut decision = if score >= BLOCK_THRESHOLD {
            Decision::Block
        } else if score >= REVIEW_THRESHOLD {
            Decision::Review
        } else {
            Decision::Allow
        };

        if decision == Decision::Review
            && findings.len() == 1
            && findings[0].rule == BENIGN_IMPORT_RULE
        {
            tracing::debug!(score, "benign import mention only, downgrading review to allow");
            decision = Decision::Allow;
        }

        RiskAssessment {
            cleaned,
            findings,
            score,
            decision,
        }
    }

    /// Stricter optional gate: accept only short text made entirely of safe
    /// characters. Not part of the default allow/review/block path.
    pub fn allowlist_only(&self, cleaned: &str) -> bool {
        if cleaned.len() > self.allowlist_max_len {
            return false;
        }
        self.safe_chars.is_match(cleaned)
    }

    /// Escape angle brackets for safe HTML display of cleaned text.
    pub fn sanitize_for_display(cleaned: &str) -> String {
        cleaned.replace('<', "&lt;").replace('>', "&gt;")
    }
}
