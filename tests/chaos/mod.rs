//! Chaos testing for treecache
//!
//! The input tree may change while it is being fingerprinted. These tests
//! churn a tree from another thread and check that walks degrade to
//! sentinels instead of failing, and that the writer converges once the
//! churn stops.

use ::treecache::*;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

/// Repeatedly creates and deletes files and directories under `root`
fn churn(root: &Path, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    let root = root.to_path_buf();
    thread::spawn(move || {
        let mut i = 0u64;
        while !stop.load(Ordering::Relaxed) {
            let dir = root.join(format!("d{}", i % 7));
            let file = dir.join(format!("f{}.txt", i % 13));
            let _ = fs::create_dir_all(&dir);
            let _ = fs::write(&file, i.to_le_bytes());
            if i % 3 == 0 {
                let _ = fs::remove_dir_all(&dir);
            }
            i += 1;
        }
    })
}

#[test]
fn test_fingerprint_survives_concurrent_churn() {
    let temp_dir = TempDir::new().unwrap();
    let stop = Arc::new(AtomicBool::new(false));
    let worker = churn(temp_dir.path(), Arc::clone(&stop));

    let filter = PathFilter::default();
    for _ in 0..200 {
        let fingerprint = TreeFingerprinter::new(&filter).fingerprint(temp_dir.path());
        assert!(!fingerprint.tokens().is_empty());
    }

    stop.store(true, Ordering::Relaxed);
    worker.join().unwrap();

    // Once quiet, walks agree again
    let first = TreeFingerprinter::new(&filter).fingerprint(temp_dir.path());
    let second = TreeFingerprinter::new(&filter).fingerprint(temp_dir.path());
    assert_eq!(first, second);
    assert_eq!(first.anomalies, 0);
}

#[tokio::test]
async fn test_writer_converges_after_churn() {
    let input = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let cache_root = TempDir::new().unwrap();
    let stop = Arc::new(AtomicBool::new(false));
    let worker = churn(input.path(), Arc::clone(&stop));

    let mut writer = CachingWriterBuilder::new()
        .cache_root(cache_root.path())
        .build(RebuildFn::new(|input: &Path, cache: &Path| {
            let count = utils::list_relative_paths(input).map(|p| p.len()).unwrap_or(0);
            fs::write(cache.join("count"), count.to_string())?;
            Ok(())
        }))
        .unwrap();

    for _ in 0..20 {
        writer.write(input.path(), dest.path()).await.unwrap();
        assert!(dest.path().join("count").exists());
    }

    stop.store(true, Ordering::Relaxed);
    worker.join().unwrap();

    writer.write(input.path(), dest.path()).await.unwrap();
    let settled = writer.write(input.path(), dest.path()).await.unwrap();
    assert!(!settled.rebuilt);
}
