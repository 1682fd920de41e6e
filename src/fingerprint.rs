//! Metadata fingerprinting of directory trees
//!
//! The fingerprint engine walks an input directory depth-first and emits a
//! flat sequence of [`Token`]s describing what it saw. Nothing is read from
//! file contents; the change signal is metadata only, which keeps a walk
//! O(entries) rather than O(bytes).
//!
//! ## Token layout
//!
//! For every node that is not filtered out the walk emits
//!
//! ```text
//! "path", <relative path>, "stats", <mode> [, <mtime ms>, <size>] , <children...>
//! ```
//!
//! - the relative path of the root is `"."`
//! - mtime and size are only present for regular files
//! - children follow their directory, in lexical order of their names
//! - a node whose metadata cannot be read emits `"stat failed"` instead of
//!   its stat tokens, and a directory that cannot be listed emits
//!   `"readdir failed"` instead of children
//!
//! Regular files rejected by the [`PathFilter`] contribute nothing at all.
//! Directories are never filtered, so adding or removing an empty directory
//! still changes the fingerprint.
//!
//! ## Example
//!
//! ```rust,no_run
//! use treecache::filter::PathFilter;
//! use treecache::fingerprint::TreeFingerprinter;
//! use std::path::Path;
//!
//! let filter = PathFilter::default();
//! let before = TreeFingerprinter::new(&filter).fingerprint(Path::new("./src"));
//! // ... edit a file ...
//! let after = TreeFingerprinter::new(&filter).fingerprint(Path::new("./src"));
//! if before.digest() != after.digest() {
//!     println!("input changed");
//! }
//! ```

use crate::filter::PathFilter;
use crate::utils;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, trace, warn};

/// Sentinel emitted when a node's metadata cannot be read
pub const STAT_FAILED: &str = "stat failed";

/// Sentinel emitted when a directory cannot be listed
pub const READDIR_FAILED: &str = "readdir failed";

/// One opaque element of a fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// Markers, relative paths and identities
    Text(String),
    /// Modes, modification times and sizes
    Number(i64),
}

impl Token {
    fn text(s: impl Into<String>) -> Self {
        Token::Text(s.into())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Text(s) => f.write_str(s),
            Token::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Ordered token sequence summarizing a tree, plus walk counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint {
    tokens: Vec<Token>,
    /// Regular files whose metadata went into the fingerprint
    pub files: usize,
    /// Directories walked, the root included
    pub directories: usize,
    /// Regular files left out by the filter
    pub ignored: usize,
    /// Stat or readdir failures recorded as sentinels
    pub anomalies: usize,
}

impl Fingerprint {
    /// The raw token sequence
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Consume the fingerprint, keeping only its tokens
    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    /// Reduce the token sequence to a single comparable digest
    pub fn digest(&self) -> String {
        digest_tokens(&self.tokens)
    }
}

/// Hash a token sequence the same way [`Fingerprint::digest`] does
pub fn digest_tokens(tokens: &[Token]) -> String {
    utils::hash_strings(tokens.iter().map(Token::to_string))
}

/// Walks a directory tree and produces its [`Fingerprint`]
///
/// Each call re-walks the filesystem; nothing is cached between calls apart
/// from the filter's own verdict memo.
#[derive(Debug, Clone, Copy)]
pub struct TreeFingerprinter<'a> {
    filter: &'a PathFilter,
    directory_identity: bool,
}

impl<'a> TreeFingerprinter<'a> {
    /// Create a fingerprinter that consults `filter` for regular files
    pub fn new(filter: &'a PathFilter) -> Self {
        Self {
            filter,
            directory_identity: false,
        }
    }

    /// Also record device and inode of every directory
    ///
    /// With this enabled a directory that is deleted and recreated with the
    /// same contents fingerprints differently. Leave it off when an upstream
    /// step recreates the input directory on every build.
    pub fn with_directory_identity(mut self, enabled: bool) -> Self {
        self.directory_identity = enabled;
        self
    }

    /// Fingerprint the tree rooted at `root`
    ///
    /// Never fails: a missing root simply yields `["path", ".", "stat failed"]`.
    pub fn fingerprint(&self, root: &Path) -> Fingerprint {
        let mut fingerprint = Fingerprint::default();
        self.walk(root, ".", &mut fingerprint);
        debug!(
            "Fingerprinted {:?}: {} files, {} directories, {} ignored, {} anomalies",
            root, fingerprint.files, fingerprint.directories, fingerprint.ignored, fingerprint.anomalies
        );
        fingerprint
    }

    fn walk(&self, full_path: &Path, relative_path: &str, out: &mut Fingerprint) {
        let metadata = match fs::metadata(full_path) {
            Ok(metadata) => metadata,
            Err(e) => {
                // Most likely removed between listing and stat
                warn!("Failed to stat {:?}: {}", full_path, e);
                out.anomalies += 1;
                out.tokens.push(Token::text("path"));
                out.tokens.push(Token::text(relative_path));
                out.tokens.push(Token::text(STAT_FAILED));
                return;
            }
        };

        if metadata.is_file() && self.filter.should_be_ignored(full_path) {
            trace!("Ignoring {:?} for fingerprint", full_path);
            out.ignored += 1;
            return;
        }

        out.tokens.push(Token::text("path"));
        out.tokens.push(Token::text(relative_path));
        out.tokens.push(Token::text("stats"));
        out.tokens.push(Token::Number(i64::from(utils::file_mode(&metadata))));

        if metadata.is_dir() {
            out.directories += 1;
            if self.directory_identity {
                if let Some(identity) = utils::directory_identity(&metadata) {
                    out.tokens.push(Token::Text(identity));
                }
            }

            match sorted_entries(full_path) {
                Ok(names) => {
                    for name in names {
                        let child_relative = join_relative(relative_path, &name);
                        self.walk(&full_path.join(&name), &child_relative, out);
                    }
                }
                Err(e) => {
                    warn!("Failed to read directory {:?}: {}", full_path, e);
                    out.anomalies += 1;
                    out.tokens.push(Token::text(READDIR_FAILED));
                }
            }
        } else if metadata.is_file() {
            out.files += 1;
            out.tokens.push(Token::Number(utils::mtime_millis(&metadata)));
            out.tokens.push(Token::Number(metadata.len() as i64));
        }
    }
}

fn sorted_entries(dir: &Path) -> io::Result<Vec<OsString>> {
    let mut names = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<io::Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}

fn join_relative(parent: &str, name: &OsString) -> String {
    let name = name.to_string_lossy();
    if parent == "." {
        name.into_owned()
    } else {
        format!("{}/{}", parent, name)
    }
}
