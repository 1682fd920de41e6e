//! The caching writer
//!
//! [`CachingWriter`] is the entry point a build pipeline drives once per
//! build cycle. Each [`write`](CachingWriter::write):
//!
//! 1. resolves the input directory through an [`InputResolver`]
//! 2. fingerprints it and reduces the fingerprint to a digest
//! 3. when the digest differs from the stored one (or none is stored), hands
//!    the input and a freshly emptied cache directory to the [`UpdateCache`]
//!    hook, and stores the new digest only if the hook succeeds
//! 4. materializes the cache directory into the destination, whether or not
//!    step 3 ran or failed
//!
//! A writer is not safe for overlapping writes; `write` takes `&mut self` so
//! the borrow checker rules that out.
//!
//! ## Example
//!
//! ```rust,no_run
//! use treecache::{CachingWriterBuilder, RebuildFn};
//! use std::fs;
//! use std::path::Path;
//!
//! # async fn example() -> treecache::Result<()> {
//! let mut writer = CachingWriterBuilder::new()
//!     .name("concat")
//!     .build(RebuildFn::new(|input: &Path, cache: &Path| {
//!         let mut bundle = String::new();
//!         for entry in fs::read_dir(input)? {
//!             bundle.push_str(&fs::read_to_string(entry?.path())?);
//!         }
//!         fs::write(cache.join("bundle.txt"), bundle)?;
//!         Ok(())
//!     }))?;
//!
//! let outcome = writer.write(Path::new("./src"), Path::new("./dist")).await?;
//! println!("rebuilt: {}", outcome.rebuilt);
//! # Ok(())
//! # }
//! ```

use crate::cache_slot::CacheSlot;
use crate::error::{Result, TreeCacheError};
use crate::filter::{PathFilter, PathMatcher};
use crate::fingerprint::{Fingerprint, Token, TreeFingerprinter};
use crate::materialize::Materializer;
use crate::types::{LinkMode, MaterializeStats, WriteOutcome, WriterConfig};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Rebuild logic supplied by the concrete build step
///
/// `cache_dir` is always empty when this is called. Whatever the hook leaves
/// there becomes the cached output that later writes replay.
#[async_trait]
pub trait UpdateCache: Send {
    /// Regenerate `cache_dir` from `input_dir`
    ///
    /// Returning an error fails the current write and leaves no stored
    /// digest, so the next write retries whatever the input looks like.
    async fn update_cache(&mut self, input_dir: &Path, cache_dir: &Path) -> Result<()>;
}

/// [`UpdateCache`] backed by a synchronous closure
pub struct RebuildFn<F> {
    f: F,
}

impl<F> RebuildFn<F>
where
    F: FnMut(&Path, &Path) -> Result<()> + Send,
{
    /// Wrap `f` as a rebuild hook
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> std::fmt::Debug for RebuildFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RebuildFn")
    }
}

#[async_trait]
impl<F> UpdateCache for RebuildFn<F>
where
    F: FnMut(&Path, &Path) -> Result<()> + Send,
{
    async fn update_cache(&mut self, input_dir: &Path, cache_dir: &Path) -> Result<()> {
        (self.f)(input_dir, cache_dir)
    }
}

/// Produces the concrete input directory for a write
#[async_trait]
pub trait InputResolver: Sync {
    /// Resolve to the directory to fingerprint and rebuild from
    async fn resolve(&self) -> Result<PathBuf>;
}

#[async_trait]
impl InputResolver for Path {
    async fn resolve(&self) -> Result<PathBuf> {
        Ok(self.to_path_buf())
    }
}

#[async_trait]
impl InputResolver for PathBuf {
    async fn resolve(&self) -> Result<PathBuf> {
        Ok(self.clone())
    }
}

/// Memoizes a directory-to-directory build step
///
/// See the [module documentation](self) for the write cycle.
pub struct CachingWriter<U> {
    name: String,
    filter: PathFilter,
    materializer: Materializer,
    slot: CacheSlot,
    directory_identity: bool,
    rebuilder: U,
    cache_digest: Option<String>,
    cache_tree_keys: Option<Vec<Token>>,
}

impl<U> std::fmt::Debug for CachingWriter<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingWriter")
            .field("name", &self.name)
            .field("filter", &self.filter)
            .field("materializer", &self.materializer)
            .field("slot", &self.slot)
            .field("directory_identity", &self.directory_identity)
            .field("cache_digest", &self.cache_digest)
            .field("cache_tree_keys", &self.cache_tree_keys.as_ref().map(Vec::len))
            .finish()
    }
}

impl<U: UpdateCache> CachingWriter<U> {
    /// Run one build cycle into `dest_dir`
    ///
    /// # Errors
    ///
    /// - the resolver's error, before anything else happens
    /// - the rebuild hook's error; the destination is still materialized from
    ///   whatever the cache holds
    /// - [`TreeCacheError::Materialize`] or
    ///   [`TreeCacheError::UnsupportedFileType`] when materialization fails;
    ///   the destination may then be partially written
    ///
    /// When both the rebuild and the materialization fail, the rebuild error
    /// is returned and the materialization error is logged.
    #[instrument(skip(self, resolver))]
    pub async fn write<R>(&mut self, resolver: &R, dest_dir: &Path) -> Result<WriteOutcome>
    where
        R: InputResolver + ?Sized,
    {
        let start = Instant::now();
        let input_dir = resolver.resolve().await?;

        let fingerprint = self.keys_for_tree(&input_dir);
        let digest = fingerprint.digest();

        let rebuild = self.rebuild_if_stale(&input_dir, fingerprint, &digest).await;
        let materialized = self.materialize_cache(dest_dir);

        let rebuilt = match rebuild {
            Ok(rebuilt) => rebuilt,
            Err(e) => {
                if let Err(m) = &materialized {
                    warn!("Materialization after failed rebuild also failed: {}", m);
                }
                return Err(e);
            }
        };
        let materialized = materialized?;

        let outcome = WriteOutcome {
            rebuilt,
            digest,
            materialized,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!(
            "Write of {:?} finished in {}ms (rebuilt={})",
            dest_dir, outcome.duration_ms, outcome.rebuilt
        );
        Ok(outcome)
    }

    async fn rebuild_if_stale(
        &mut self,
        input_dir: &Path,
        fingerprint: Fingerprint,
        digest: &str,
    ) -> Result<bool> {
        if self.cache_digest.as_deref() == Some(digest) {
            debug!("Input {:?} unchanged, reusing cache", input_dir);
            return Ok(false);
        }

        info!(
            "Rebuilding {} from {:?} ({} files fingerprinted)",
            self.name, input_dir, fingerprint.files
        );
        // A wiped slot matches no digest until the hook succeeds
        self.invalidate();
        let cache_dir = self.slot.get_or_recreate()?;
        if let Err(e) = self.rebuilder.update_cache(input_dir, &cache_dir).await {
            warn!("Rebuild of {} failed: {}", self.name, e);
            return Err(e);
        }

        self.cache_digest = Some(digest.to_string());
        self.cache_tree_keys = Some(fingerprint.into_tokens());
        Ok(true)
    }
}

impl<U> CachingWriter<U> {
    /// Fingerprint `input_dir` with this writer's filter
    pub fn keys_for_tree(&self, input_dir: &Path) -> Fingerprint {
        TreeFingerprinter::new(&self.filter)
            .with_directory_identity(self.directory_identity)
            .fingerprint(input_dir)
    }

    /// Whether `full_path` is left out of the fingerprint
    pub fn should_be_ignored(&self, full_path: &Path) -> bool {
        self.filter.should_be_ignored(full_path)
    }

    /// Materialize the current cache directory, creating it if needed
    pub fn materialize_cache(&mut self, dest_dir: &Path) -> Result<MaterializeStats> {
        let cache_dir = self.slot.get_or_create()?;
        self.materializer.materialize(&cache_dir, dest_dir)
    }

    /// Digest of the input that produced the current cache
    pub fn cache_digest(&self) -> Option<&str> {
        self.cache_digest.as_deref()
    }

    /// Raw fingerprint tokens behind [`cache_digest`](Self::cache_digest)
    pub fn last_tree_keys(&self) -> Option<&[Token]> {
        self.cache_tree_keys.as_deref()
    }

    /// Current cache directory, if one has been allocated
    pub fn cache_dir(&self) -> Option<&Path> {
        self.slot.path()
    }

    /// Name used as the cache directory prefix
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The rebuild hook
    pub fn rebuilder(&self) -> &U {
        &self.rebuilder
    }

    /// The rebuild hook, mutably
    pub fn rebuilder_mut(&mut self) -> &mut U {
        &mut self.rebuilder
    }

    /// Forget the stored digest so the next write rebuilds
    pub fn invalidate(&mut self) {
        self.cache_digest = None;
        self.cache_tree_keys = None;
    }

    /// Remove the cache directory and forget the stored state
    pub fn cleanup(&mut self) -> Result<()> {
        self.invalidate();
        self.slot.release()
    }
}

/// Builder for [`CachingWriter`]
///
/// # Default Values
///
/// - `name`: `"treecache"`
/// - `include` / `exclude`: empty (nothing is filtered)
/// - `link_mode`: [`LinkMode::Auto`]
/// - `cache_root`: the system temporary directory
/// - `directory_identity`: false
#[derive(Debug, Default)]
pub struct CachingWriterBuilder {
    config: WriterConfig,
    include: Vec<Box<dyn PathMatcher>>,
    exclude: Vec<Box<dyn PathMatcher>>,
}

impl CachingWriterBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a deserialized configuration
    pub fn from_config(config: WriterConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Set the cache directory name prefix
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Add an include matcher
    pub fn include(mut self, matcher: impl PathMatcher + 'static) -> Self {
        self.include.push(Box::new(matcher));
        self
    }

    /// Add an exclude matcher
    pub fn exclude(mut self, matcher: impl PathMatcher + 'static) -> Self {
        self.exclude.push(Box::new(matcher));
        self
    }

    /// Replace the pattern-based filter configuration
    ///
    /// Matchers added with [`include`](Self::include) and
    /// [`exclude`](Self::exclude) are kept and consulted after these.
    pub fn filter_config(mut self, filter: crate::filter::FilterConfig) -> Self {
        self.config.filter = filter;
        self
    }

    /// Set how cached files reach the destination
    pub fn link_mode(mut self, mode: LinkMode) -> Self {
        self.config.link_mode = mode;
        self
    }

    /// Set where cache directories are allocated
    pub fn cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.cache_root = Some(root.into());
        self
    }

    /// Record directory device/inode in fingerprints
    pub fn directory_identity(mut self, enabled: bool) -> Self {
        self.config.directory_identity = enabled;
        self
    }

    /// Build the writer around `rebuilder`
    ///
    /// # Errors
    ///
    /// - [`TreeCacheError::InvalidConfiguration`] for an empty name or one
    ///   containing a path separator
    /// - [`TreeCacheError::InvalidPattern`] for a pattern that does not compile
    pub fn build<U: UpdateCache>(self, rebuilder: U) -> Result<CachingWriter<U>> {
        let name = self.config.name.trim().to_string();
        if name.is_empty() {
            return Err(TreeCacheError::configuration("writer name must not be empty"));
        }
        if name.contains(['/', '\\']) {
            return Err(TreeCacheError::configuration(format!(
                "writer name '{}' must not contain path separators",
                name
            )));
        }

        let mut filter = self.config.filter.build()?;
        for matcher in self.include {
            filter.push_include(matcher);
        }
        for matcher in self.exclude {
            filter.push_exclude(matcher);
        }

        let slot = CacheSlot::new(self.config.effective_cache_root(), &name);
        debug!("Built writer {} with cache root {:?}", name, slot.root());

        Ok(CachingWriter {
            name,
            filter,
            materializer: Materializer::new(self.config.link_mode),
            slot,
            directory_identity: self.config.directory_identity,
            rebuilder,
            cache_digest: None,
            cache_tree_keys: None,
        })
    }
}
