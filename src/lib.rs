//! # treecache - Incremental rebuild cache for directory transforms
//!
//! A build step that turns an input directory into an output directory is
//! often expensive to repeat. treecache memoizes such a step: it fingerprints
//! the input tree from cheap filesystem metadata, reruns the step only when
//! the fingerprint changes, and replays the cached output into the
//! destination on every build.
//!
//! ## Overview
//!
//! - **Fingerprinting**: a depth-first walk emits path, mode, mtime and size
//!   tokens in lexical order, reduced to a SHA-256 digest. File contents are
//!   never read.
//! - **Filtering**: include/exclude matchers (regular expressions, globs or
//!   closures) decide which files take part in the fingerprint.
//! - **Cache slot**: each writer owns one temporary directory holding the last
//!   successful rebuild's output, wiped before every rebuild.
//! - **Materialization**: cached files reach the destination through hard
//!   links when the filesystem supports them, byte copies otherwise.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use treecache::{CachingWriterBuilder, UpdateCache, Result};
//! use async_trait::async_trait;
//! use regex::Regex;
//! use std::path::Path;
//!
//! struct Minify;
//!
//! #[async_trait]
//! impl UpdateCache for Minify {
//!     async fn update_cache(&mut self, input_dir: &Path, cache_dir: &Path) -> Result<()> {
//!         for entry in std::fs::read_dir(input_dir)? {
//!             let entry = entry?;
//!             let source = std::fs::read_to_string(entry.path())?;
//!             let minified: String = source.split_whitespace().collect();
//!             std::fs::write(cache_dir.join(entry.file_name()), minified)?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let mut writer = CachingWriterBuilder::new()
//!     .name("minify")
//!     .include(Regex::new(r"\.js$").unwrap())
//!     .build(Minify)?;
//!
//! // First write rebuilds, the second replays the cache
//! writer.write(Path::new("./assets"), Path::new("./dist")).await?;
//! let outcome = writer.write(Path::new("./assets"), Path::new("./dist")).await?;
//! assert!(!outcome.rebuilt);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return `Result<T, TreeCacheError>`. Files that
//! vanish or become unreadable mid-walk never fail a build: they are recorded
//! as sentinel tokens and logged as warnings.
//!
//! ## Module Organization
//!
//! - [`writer`]: the write cycle, rebuild hook trait and builder
//! - [`fingerprint`]: tree walking and digests
//! - [`filter`]: include/exclude matching and its configuration
//! - [`cache_slot`]: the per-writer cache directory
//! - [`materialize`]: link-or-copy replay into a destination
//! - [`link`]: process-wide hard-link capability probe
//! - [`types`]: configuration and result types
//! - [`error`]: error types and handling

pub mod cache_slot;
pub mod error;
pub mod filter;
pub mod fingerprint;
pub mod link;
pub mod materialize;
pub mod types;
pub mod writer;

mod collections;
pub mod utils;

pub use cache_slot::CacheSlot;
pub use error::{Result, TreeCacheError};
pub use filter::{FilterConfig, FnMatcher, PathFilter, PathMatcher, PatternSpec};
pub use fingerprint::{Fingerprint, Token, TreeFingerprinter};
pub use materialize::Materializer;
pub use types::*;
pub use writer::{CachingWriter, CachingWriterBuilder, InputResolver, RebuildFn, UpdateCache};
