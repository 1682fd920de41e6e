//! Hard-link capability probe
//!
//! Materialization prefers hard links, which only work when the filesystem
//! supports them between the locations involved. Whether it does is checked
//! once per process by creating a throwaway file and linking it; the answer
//! is cached and shared read-only afterwards.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};
use uuid::Uuid;

static CAN_LINK: OnceLock<bool> = OnceLock::new();

/// Whether hard links work in the system temporary directory
///
/// Probed on first call and memoized for the life of the process.
pub fn can_link() -> bool {
    *CAN_LINK.get_or_init(|| probe_in(&std::env::temp_dir()))
}

/// Probe hard-link support inside `dir`
///
/// Creates a source file and tries to link a second name to it. Failing to
/// create the source counts as "no link support" rather than an error. Both
/// probe files are removed on every exit path; a failed removal is only
/// logged.
pub fn probe_in(dir: &Path) -> bool {
    let token = Uuid::new_v4().simple().to_string();
    let src = dir.join(format!(".treecache-canlink-{}.src.tmp", token));
    let dest = dir.join(format!(".treecache-canlink-{}.dest.tmp", token));

    if let Err(e) = fs::write(&src, b"") {
        debug!("Link probe could not create {:?}: {}", src, e);
        return false;
    }

    let linked = match fs::hard_link(&src, &dest) {
        Ok(()) => true,
        Err(e) => {
            debug!("Hard links unavailable in {:?}: {}", dir, e);
            false
        }
    };

    if linked {
        remove_probe_file(&dest);
    }
    remove_probe_file(&src);

    debug!("Link probe in {:?}: can_link={}", dir, linked);
    linked
}

fn remove_probe_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove link probe file {:?}: {}", path, e);
        }
    }
}
