// src/watch/patterns.rs

use std::fmt;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;
use tracing::debug;

use crate::errors::{DevloopError, Result};

/// Raw exclusion configuration, as read from `[watcher]` in the config.
///
/// ```toml
/// [watcher]
/// exclude = ["target/**", "**/*.tmp"]
/// exclude_regex = ["^\\.", "/\\.\\w+$"]
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExclusionSpec {
    pub globs: Vec<String>,
    pub regexes: Vec<String>,
}

/// Compiled, immutable set of exclusion rules.
///
/// Paths are matched relative to the watch root with forward slashes
/// (e.g. `"src/main.rs"`). Globs use path semantics: `*` never crosses a `/`,
/// `**` does.
#[derive(Clone)]
pub struct ExclusionRules {
    glob_patterns: Vec<String>,
    glob_set: GlobSet,
    regexes: Vec<Regex>,
}

impl fmt::Debug for ExclusionRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusionRules")
            .field("globs", &self.glob_patterns)
            .field(
                "regexes",
                &self.regexes.iter().map(Regex::as_str).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ExclusionRules {
    /// Compile the given spec. Any invalid glob or regex is an error.
    pub fn new(spec: &ExclusionSpec) -> Result<Self> {
        let glob_set = build_globset(&spec.globs)?;

        let regexes = spec
            .regexes
            .iter()
            .map(|pat| {
                Regex::new(pat).map_err(|e| DevloopError::InvalidPattern {
                    pattern: pat.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            glob_patterns: spec.globs.clone(),
            glob_set,
            regexes,
        })
    }

    /// Rules that exclude nothing.
    pub fn empty() -> Self {
        Self {
            glob_patterns: Vec::new(),
            glob_set: GlobSet::empty(),
            regexes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.glob_patterns.is_empty() && self.regexes.is_empty()
    }

    /// Returns true if `rel_path` is excluded. Globs are checked before
    /// regexes; the first matching rule is logged.
    pub fn is_excluded(&self, rel_path: &str) -> bool {
        if let Some(&idx) = self.glob_set.matches(rel_path).first() {
            debug!(
                path = %rel_path,
                pattern = %self.glob_patterns[idx],
                "file excluded"
            );
            return true;
        }

        if let Some(re) = self.regexes.iter().find(|re| re.is_match(rel_path)) {
            debug!(path = %rel_path, regex = %re.as_str(), "file excluded");
            return true;
        }

        false
    }
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .map_err(|e| DevloopError::InvalidPattern {
                pattern: pat.clone(),
                reason: e.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| DevloopError::InvalidPattern {
        pattern: patterns.join(", "),
        reason: e.to_string(),
    })
}
