//! Path Filter
//!
//! Decides which change events may trigger a sync, and which relative paths
//! the ignore list excludes from single-path transfers. Full mirrors hand the
//! raw patterns to rsync instead, so watching continues on ignored subtrees.

use glob::{MatchOptions, Pattern};
use std::path::Path;
use tracing::warn;

use crate::models::change::{ChangeEvent, ChangeOp};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// One compiled ignore pattern
#[derive(Debug, Clone)]
struct IgnoreRule {
    pattern: Pattern,
    /// Patterns with a leading slash match from the local root only; others
    /// match any trailing run of path components.
    anchored: bool,
}

/// Event eligibility and ignore-list matching
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    rules: Vec<IgnoreRule>,
}

impl PathFilter {
    /// Compile an ignore list.
    ///
    /// Patterns that do not parse as globs are skipped here with a warning;
    /// they are still passed verbatim to rsync.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let rules = patterns
            .iter()
            .filter_map(|raw| {
                let raw = raw.as_ref().trim();
                let body = raw.trim_end_matches('/');
                if body.is_empty() {
                    return None;
                }
                let anchored = body.starts_with('/');
                let body = body.trim_start_matches('/');
                if body.is_empty() {
                    return None;
                }
                match Pattern::new(body) {
                    Ok(pattern) => Some(IgnoreRule { pattern, anchored }),
                    Err(e) => {
                        warn!(pattern = raw, error = %e, "Ignoring unparseable ignore pattern");
                        None
                    }
                }
            })
            .collect();
        Self { rules }
    }

    /// Whether an event is eligible to trigger a sync.
    ///
    /// Permission-only changes carry no content difference and never sync.
    pub fn should_sync(&self, event: &ChangeEvent) -> bool {
        !matches!(event.op, ChangeOp::Chmod)
    }

    /// Whether a path relative to the local root matches the ignore list.
    ///
    /// A path is excluded when it, or any directory above it, matches.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        let full = relative.to_string_lossy().replace('\\', "/");
        let components: Vec<&str> = full.split('/').filter(|c| !c.is_empty()).collect();

        (1..=components.len()).any(|end| {
            self.rules.iter().any(|rule| {
                let starts = if rule.anchored { 0..1 } else { 0..end };
                starts.into_iter().any(|start| {
                    let candidate = components[start..end].join("/");
                    rule.pattern.matches_with(&candidate, MATCH_OPTIONS)
                })
            })
        })
    }

    /// Number of usable patterns
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
