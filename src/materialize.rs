//! Replaying a cache directory into a destination
//!
//! The [`Materializer`] reproduces every regular file of a cache directory
//! under a destination directory, preferring hard links and falling back to
//! byte copies. The destination is emptied first, so after a successful run
//! it holds exactly the cache's files. Directories only appear in the
//! destination as parents of files; an empty cached directory is not
//! reproduced.

use crate::error::{Result, TreeCacheError};
use crate::types::{LinkMode, MaterializeStats};
use crate::utils;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Copies or links a cache directory's files into a destination
#[derive(Debug, Clone, Copy, Default)]
pub struct Materializer {
    mode: LinkMode,
}

impl Materializer {
    /// Create a materializer using `mode` for file transfer
    pub fn new(mode: LinkMode) -> Self {
        Self { mode }
    }

    /// The configured transfer mode
    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    /// Replace the contents of `dest_dir` with the files of `cache_dir`
    ///
    /// A missing `cache_dir` is treated as empty. Partial output is left in
    /// place when a transfer fails.
    ///
    /// # Errors
    ///
    /// - [`TreeCacheError::UnsupportedFileType`] if the cache holds anything
    ///   other than regular files and directories
    /// - [`TreeCacheError::Materialize`] if a cache entry cannot be read
    ///   (a dangling link, say) or a directory or file cannot be written at
    ///   the destination
    pub fn materialize(&self, cache_dir: &Path, dest_dir: &Path) -> Result<MaterializeStats> {
        reset_destination(dest_dir)?;

        let mut stats = MaterializeStats::default();
        if !cache_dir.exists() {
            debug!("Cache directory {:?} does not exist, destination left empty", cache_dir);
            return Ok(stats);
        }

        let link = self.mode.wants_link();
        for relative in list_cache(cache_dir)? {
            let src = cache_dir.join(&relative);
            let metadata = fs::metadata(&src).map_err(|source| TreeCacheError::Materialize {
                path: src.clone(),
                source,
            })?;

            if metadata.is_dir() {
                stats.directories += 1;
                continue;
            }
            if !metadata.is_file() {
                return Err(TreeCacheError::UnsupportedFileType { path: src });
            }

            let dest = dest_dir.join(&relative);
            if let Some(parent) = dest.parent() {
                utils::ensure_dir(parent).map_err(|e| match e {
                    TreeCacheError::Io(source) => TreeCacheError::Materialize {
                        path: parent.to_path_buf(),
                        source,
                    },
                    other => other,
                })?;
            }

            if link {
                match fs::hard_link(&src, &dest) {
                    Ok(()) => {
                        trace!("Linked {:?}", relative);
                        stats.files_linked += 1;
                        continue;
                    }
                    Err(e) if self.mode == LinkMode::Auto => {
                        trace!("Link failed for {:?} ({}), copying", relative, e);
                    }
                    Err(e) => return Err(TreeCacheError::Materialize { path: dest, source: e }),
                }
            }

            let bytes = copy_file(&src, &dest)
                .map_err(|source| TreeCacheError::Materialize { path: dest.clone(), source })?;
            trace!("Copied {:?} ({} bytes)", relative, bytes);
            stats.files_copied += 1;
            stats.bytes_copied += bytes;
        }

        debug!(
            "Materialized {:?} into {:?}: {} linked, {} copied ({})",
            cache_dir,
            dest_dir,
            stats.files_linked,
            stats.files_copied,
            utils::format_bytes(stats.bytes_copied)
        );
        Ok(stats)
    }
}

/// List the cache, naming the offending entry when the walk fails
fn list_cache(cache_dir: &Path) -> Result<Vec<PathBuf>> {
    utils::list_relative_paths(cache_dir).map_err(|e| match e {
        TreeCacheError::WalkDir(err) => {
            let path = err.path().map(Path::to_path_buf);
            match path {
                Some(path) => TreeCacheError::Materialize { path, source: err.into() },
                None => TreeCacheError::WalkDir(err),
            }
        }
        other => other,
    })
}

fn reset_destination(dest_dir: &Path) -> Result<()> {
    let wrap = |source: io::Error| TreeCacheError::Materialize {
        path: dest_dir.to_path_buf(),
        source,
    };

    match fs::symlink_metadata(dest_dir) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(dest_dir).map_err(wrap)?,
        Ok(_) => fs::remove_file(dest_dir).map_err(wrap)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(wrap(e)),
    }
    fs::create_dir_all(dest_dir).map_err(wrap)
}

fn copy_file(src: &Path, dest: &Path) -> io::Result<u64> {
    let contents = fs::read(src)?;
    fs::write(dest, &contents)?;
    Ok(contents.len() as u64)
}
