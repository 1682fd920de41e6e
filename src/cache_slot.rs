//! Per-writer cache directory
//!
//! A [`CacheSlot`] owns at most one temporary directory at a time. The
//! directory holds the output of the last rebuild and is handed to the rebuild
//! hook empty every time a rebuild starts. Dropping the slot removes the
//! directory.

use crate::error::Result;
use crate::utils;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Lazily allocated, wipe-on-demand cache directory
#[derive(Debug)]
pub struct CacheSlot {
    root: PathBuf,
    prefix: String,
    dir: Option<TempDir>,
}

impl CacheSlot {
    /// Create a slot that allocates under `root` with a `<name>-` prefix
    ///
    /// Nothing is created on disk until the first accessor call.
    pub fn new(root: impl Into<PathBuf>, name: &str) -> Self {
        Self {
            root: root.into(),
            prefix: format!("{}-", name),
            dir: None,
        }
    }

    /// Directory under which slots are allocated
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the current directory, if one is allocated
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Return the current directory, allocating one if needed
    pub fn get_or_create(&mut self) -> Result<PathBuf> {
        if let Some(dir) = &self.dir {
            return Ok(dir.path().to_path_buf());
        }
        self.allocate()
    }

    /// Return a fresh, empty directory, discarding any previous one
    ///
    /// The new directory may live at a different path than the old one.
    pub fn get_or_recreate(&mut self) -> Result<PathBuf> {
        if let Some(old) = self.dir.take() {
            let old_path = old.path().to_path_buf();
            old.close()?;
            debug!("Wiped cache directory {:?}", old_path);
        }
        self.allocate()
    }

    /// Remove the directory and forget it; calling again is a no-op
    pub fn release(&mut self) -> Result<()> {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            dir.close()?;
            debug!("Released cache directory {:?}", path);
        }
        Ok(())
    }

    fn allocate(&mut self) -> Result<PathBuf> {
        utils::ensure_dir(&self.root)?;
        let dir = tempfile::Builder::new()
            .prefix(&self.prefix)
            .tempdir_in(&self.root)?;
        let path = dir.path().to_path_buf();
        debug!("Allocated cache directory {:?}", path);
        self.dir = Some(dir);
        Ok(path)
    }
}

impl Drop for CacheSlot {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to remove cache directory: {}", e);
        }
    }
}
