//! Utility functions for treecache
//!
//! Small filesystem and hashing helpers shared by the fingerprint engine, the
//! materializer and the CLI:
//!
//! - Hashing an ordered sequence of strings down to one digest
//! - Recursive directory creation
//! - Recursive listing of the paths beneath a directory
//! - Cross-platform extraction of file mode and modification time
//! - Byte formatting for reports

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::trace;
use walkdir::WalkDir;

/// Hash an ordered sequence of strings using SHA-256
///
/// Each string is followed by a NUL separator so that `["ab", "c"]` and
/// `["a", "bc"]` produce different digests. Equal sequences always produce
/// the same 64-character hexadecimal digest.
///
/// # Example
///
/// ```rust,ignore
/// use crate::utils::hash_strings;
///
/// let a = hash_strings(["path", ".", "stats", "16877"]);
/// let b = hash_strings(["path", ".", "stats", "16877"]);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
pub fn hash_strings<I, S>(strings: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for s in strings {
        hasher.update(s.as_ref().as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Ensure a directory and all of its ancestors exist
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.is_dir() {
        fs::create_dir_all(path)?;
        trace!("Created directory: {:?}", path);
    }
    Ok(())
}

/// List every path beneath `root`, relative to it
///
/// Directories are listed before their contents and siblings come out in
/// file-name order, so repeated listings of an unchanged tree are identical.
/// The root itself is not included. Symbolic links are followed, so files
/// under a linked directory are listed beneath the link's own path; a
/// dangling link or a link cycle is an error.
pub fn list_relative_paths(root: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| entry.path().to_path_buf());
        paths.push(relative);
    }
    Ok(paths)
}

/// Get the mode bits recorded for an entry
///
/// On Unix this is the raw `st_mode`, file type bits included, so a path that
/// flips between file and directory changes its mode token too.
#[cfg(unix)]
pub fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    metadata.mode()
}

/// Get the mode bits recorded for an entry (Windows implementation)
///
/// Windows has no `st_mode`; synthesize the type bits and a permission
/// triple from the read-only attribute.
#[cfg(not(unix))]
pub fn file_mode(metadata: &fs::Metadata) -> u32 {
    const S_IFDIR: u32 = 0o040000;
    const S_IFREG: u32 = 0o100000;

    let mut mode = if metadata.permissions().readonly() { 0o444 } else { 0o644 };
    if metadata.is_dir() {
        mode |= S_IFDIR | 0o111;
    } else {
        mode |= S_IFREG;
    }
    mode
}

/// Identity of the physical directory behind `metadata`
///
/// Device and inode joined by a NUL. Platforms without inode numbers get
/// `None`; the fingerprint then relies on path and mode alone.
#[cfg(unix)]
pub fn directory_identity(metadata: &fs::Metadata) -> Option<String> {
    use std::os::unix::fs::MetadataExt;
    Some(format!("{}\x00{}", metadata.dev(), metadata.ino()))
}

/// Identity of the physical directory behind `metadata` (unsupported here)
#[cfg(not(unix))]
pub fn directory_identity(_metadata: &fs::Metadata) -> Option<String> {
    None
}

/// Modification time in milliseconds relative to the Unix epoch
///
/// Times before the epoch come out negative. A platform that cannot report
/// mtime yields 0, which still fingerprints consistently across walks.
pub fn mtime_millis(metadata: &fs::Metadata) -> i64 {
    match metadata.modified() {
        Ok(modified) => system_time_millis(modified),
        Err(_) => 0,
    }
}

fn system_time_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_millis() as i64,
        Err(before) => -(before.duration().as_millis() as i64),
    }
}

/// Format bytes in human-readable form
///
/// Uses binary (1024-based) units; values under 1 KB are printed whole.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
