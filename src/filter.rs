//! Include/exclude filtering of fingerprinted files
//!
//! A [`PathFilter`] decides whether a regular file takes part in the input
//! fingerprint. It holds two ordered lists of [`PathMatcher`]s:
//!
//! - `exclude`: the first match ignores the file, regardless of `include`
//! - `include`: when non-empty, a file must match one of these to be kept
//!
//! With both lists empty nothing is ignored. Verdicts are memoized per full
//! path for the lifetime of the filter and never invalidated.
//!
//! ## Configuration
//!
//! Filters can be described as JSON through [`FilterConfig`]. Plain strings
//! are regular expressions searched in the full path; objects of the form
//! `{"glob": "..."}` are globs matched against the full path.
//!
//! ```rust
//! use treecache::filter::FilterConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FilterConfig::from_json_str(
//!     r#"{ "include": ["\\.js$", { "glob": "**/*.css" }], "exclude": ["/vendor/"] }"#,
//! )?;
//! let filter = config.build()?;
//! assert!(filter.should_be_ignored("/app/vendor/lib.js".as_ref()));
//! assert!(!filter.should_be_ignored("/app/main.js".as_ref()));
//! # Ok(())
//! # }
//! ```

use crate::collections::HashMap;
use crate::error::{Result, TreeCacheError};
use globset::{Glob, GlobMatcher};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Anything that can test a path
pub trait PathMatcher: fmt::Debug + Send + Sync {
    /// Whether `path` matches
    fn test(&self, path: &Path) -> bool;
}

impl PathMatcher for Regex {
    fn test(&self, path: &Path) -> bool {
        self.is_match(&path.to_string_lossy())
    }
}

impl PathMatcher for GlobMatcher {
    fn test(&self, path: &Path) -> bool {
        self.is_match(path)
    }
}

/// Matcher backed by a closure
pub struct FnMatcher<F> {
    label: String,
    f: F,
}

impl<F> FnMatcher<F>
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    /// Wrap `f`; `label` only shows up in debug output
    pub fn new(label: impl Into<String>, f: F) -> Self {
        Self { label: label.into(), f }
    }
}

impl<F> fmt::Debug for FnMatcher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnMatcher").field(&self.label).finish()
    }
}

impl<F> PathMatcher for FnMatcher<F>
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn test(&self, path: &Path) -> bool {
        (self.f)(path)
    }
}

/// One pattern as written in a configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PatternSpec {
    /// Regular expression searched anywhere in the full path
    Regex(String),
    /// Glob matched against the full path
    Glob {
        /// The glob expression
        glob: String,
    },
}

impl PatternSpec {
    /// Compile into a matcher
    ///
    /// # Errors
    ///
    /// [`TreeCacheError::InvalidPattern`] if the expression does not compile.
    pub fn compile(&self) -> Result<Box<dyn PathMatcher>> {
        match self {
            PatternSpec::Regex(pattern) => {
                let regex = Regex::new(pattern).map_err(|e| TreeCacheError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
                Ok(Box::new(regex))
            }
            PatternSpec::Glob { glob } => {
                let matcher = Glob::new(glob)
                    .map_err(|e| TreeCacheError::InvalidPattern {
                        pattern: glob.clone(),
                        reason: e.to_string(),
                    })?
                    .compile_matcher();
                Ok(Box::new(matcher))
            }
        }
    }
}

/// Serializable include/exclude lists
///
/// Either list may be omitted and then defaults to empty. Any other shape,
/// e.g. a bare string where a list belongs, fails to parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Patterns a file must match (one of) to be kept, when non-empty
    #[serde(default)]
    pub include: Vec<PatternSpec>,
    /// Patterns that ignore a file outright
    #[serde(default)]
    pub exclude: Vec<PatternSpec>,
}

impl FilterConfig {
    /// Parse a JSON filter description
    ///
    /// # Errors
    ///
    /// [`TreeCacheError::Json`] when the document is malformed, including when
    /// `include` or `exclude` is present but not a list.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Compile every pattern into a [`PathFilter`]
    pub fn build(&self) -> Result<PathFilter> {
        let include = self.include.iter().map(PatternSpec::compile).collect::<Result<Vec<_>>>()?;
        let exclude = self.exclude.iter().map(PatternSpec::compile).collect::<Result<Vec<_>>>()?;
        Ok(PathFilter::new(include, exclude))
    }
}

/// Memoizing include/exclude decision for file paths
#[derive(Debug, Default)]
pub struct PathFilter {
    include: Vec<Box<dyn PathMatcher>>,
    exclude: Vec<Box<dyn PathMatcher>>,
    verdicts: Mutex<HashMap<PathBuf, bool>>,
}

impl PathFilter {
    /// Create a filter from already-compiled matchers
    pub fn new(include: Vec<Box<dyn PathMatcher>>, exclude: Vec<Box<dyn PathMatcher>>) -> Self {
        Self {
            include,
            exclude,
            verdicts: Mutex::new(HashMap::default()),
        }
    }

    /// Append an include matcher
    pub fn push_include(&mut self, matcher: Box<dyn PathMatcher>) {
        self.include.push(matcher);
        self.verdicts.get_mut().clear();
    }

    /// Append an exclude matcher
    pub fn push_exclude(&mut self, matcher: Box<dyn PathMatcher>) {
        self.exclude.push(matcher);
        self.verdicts.get_mut().clear();
    }

    /// Whether no rule can ever ignore a path
    pub fn is_unrestricted(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Number of memoized verdicts
    pub fn cached_verdicts(&self) -> usize {
        self.verdicts.lock().len()
    }

    /// Decide whether `full_path` is left out of the fingerprint
    ///
    /// Exclude rules are consulted first and win on the first match. If any
    /// include rules exist the path is kept only when one of them matches.
    /// The verdict is memoized before returning.
    pub fn should_be_ignored(&self, full_path: &Path) -> bool {
        if let Some(&verdict) = self.verdicts.lock().get(full_path) {
            return verdict;
        }

        let verdict = self.evaluate(full_path);
        trace!("Filter verdict for {:?}: ignored={}", full_path, verdict);
        self.verdicts.lock().insert(full_path.to_path_buf(), verdict);
        verdict
    }

    fn evaluate(&self, full_path: &Path) -> bool {
        if self.exclude.iter().any(|m| m.test(full_path)) {
            return true;
        }

        if !self.include.is_empty() {
            return !self.include.iter().any(|m| m.test(full_path));
        }

        false
    }
}
