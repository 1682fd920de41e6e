//! Core data types shared across treecache
//!
//! - **Configuration**: [`WriterConfig`], [`LinkMode`] - how a writer filters,
//!   where it keeps its cache and how it transfers files
//! - **Results**: [`MaterializeStats`], [`WriteOutcome`] - what a write did
//!
//! ## Examples
//!
//! ```rust
//! use treecache::types::{LinkMode, WriterConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WriterConfig::from_json_str(
//!     r#"{ "name": "sass", "link_mode": "copy", "filter": { "include": ["\\.scss$"] } }"#,
//! )?;
//! assert_eq!(config.link_mode, LinkMode::Copy);
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::filter::FilterConfig;
use crate::link;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How cached files reach the destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    /// Hard link when the process-wide probe says links work, copying any
    /// file whose link attempt still fails
    #[default]
    Auto,
    /// Always hard link; a failed link is a materialization error
    HardLink,
    /// Always copy bytes
    Copy,
}

impl LinkMode {
    /// Whether this mode attempts hard links at all
    pub fn wants_link(self) -> bool {
        match self {
            LinkMode::Auto => link::can_link(),
            LinkMode::HardLink => true,
            LinkMode::Copy => false,
        }
    }
}

/// Serializable writer configuration
///
/// Every field has a default, so `{}` is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct WriterConfig {
    /// Prefix for the cache directory name
    pub name: String,
    /// Include/exclude rules for fingerprinting
    pub filter: FilterConfig,
    /// File transfer strategy
    pub link_mode: LinkMode,
    /// Where cache directories are allocated (system temp dir when unset)
    pub cache_root: Option<PathBuf>,
    /// Record device/inode of input directories in the fingerprint
    pub directory_identity: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            name: "treecache".to_string(),
            filter: FilterConfig::default(),
            link_mode: LinkMode::default(),
            cache_root: None,
            directory_identity: false,
        }
    }
}

impl WriterConfig {
    /// Parse a JSON writer configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The configured cache root, or the system temporary directory
    pub fn effective_cache_root(&self) -> PathBuf {
        self.cache_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Counters from one materialization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializeStats {
    /// Files transferred by hard link
    pub files_linked: usize,
    /// Files transferred by copying bytes
    pub files_copied: usize,
    /// Bytes written by copies
    pub bytes_copied: u64,
    /// Directories traversed in the cache
    pub directories: usize,
}

impl MaterializeStats {
    /// Total files placed in the destination
    pub fn files(&self) -> usize {
        self.files_linked + self.files_copied
    }
}

/// Result of a successful write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    /// Whether the rebuild hook ran during this write
    pub rebuilt: bool,
    /// Fingerprint digest of the input at the time of the write
    pub digest: String,
    /// What materialization did
    pub materialized: MaterializeStats,
    /// Wall time of the whole write
    pub duration_ms: u64,
}
