//! Integration tests for treecache
//!
//! Exercises writers across many build cycles the way a pipeline would:
//! nested trees, filters from JSON, async resolvers and failing rebuilds.

use ::treecache::*;
use async_trait::async_trait;
use filetime::{set_file_mtime, FileTime};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Test harness for multi-cycle build scenarios
pub struct BuildHarness {
    pub input: TempDir,
    pub dest: TempDir,
    pub cache_root: TempDir,
    pub rebuilds: Arc<AtomicUsize>,
}

impl BuildHarness {
    pub fn new() -> Self {
        Self {
            input: TempDir::new().unwrap(),
            dest: TempDir::new().unwrap(),
            cache_root: TempDir::new().unwrap(),
            rebuilds: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Write `content` at `relative` under the input with a fixed mtime
    pub fn put(&self, relative: &str, content: &str, mtime: i64) {
        let path = self.input.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
    }

    /// Writer whose rebuild concatenates every kept file into `bundle.txt`
    pub fn bundler(&self, builder: CachingWriterBuilder) -> CachingWriter<Bundler> {
        builder
            .cache_root(self.cache_root.path())
            .build(Bundler {
                calls: Arc::clone(&self.rebuilds),
            })
            .unwrap()
    }

    pub fn rebuild_count(&self) -> usize {
        self.rebuilds.load(Ordering::SeqCst)
    }

    /// Every regular file under `root` with its bytes
    pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        utils::list_relative_paths(root)
            .unwrap()
            .into_iter()
            .filter(|relative| root.join(relative).is_file())
            .map(|relative| {
                let bytes = fs::read(root.join(&relative)).unwrap();
                (relative, bytes)
            })
            .collect()
    }
}

pub struct Bundler {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl UpdateCache for Bundler {
    async fn update_cache(&mut self, input_dir: &Path, cache_dir: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut bundle = String::new();
        for relative in utils::list_relative_paths(input_dir)? {
            let full = input_dir.join(&relative);
            if full.is_file() {
                bundle.push_str(&format!("// {}\n", relative.display()));
                bundle.push_str(&tokio::fs::read_to_string(&full).await?);
                bundle.push('\n');
            }
        }
        fs::create_dir_all(cache_dir.join("assets"))?;
        fs::write(cache_dir.join("assets/bundle.txt"), bundle)?;
        Ok(())
    }
}

/// Resolver that yields to the runtime before answering
struct DeferredInput(PathBuf);

#[async_trait]
impl InputResolver for DeferredInput {
    async fn resolve(&self) -> Result<PathBuf> {
        tokio::task::yield_now().await;
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn test_destination_matches_cache_after_every_write() {
    let harness = BuildHarness::new();
    harness.put("a.js", "let a = 1;", 100);
    harness.put("lib/b.js", "let b = 2;", 100);
    let mut writer = harness.bundler(CachingWriterBuilder::new().name("bundle"));

    for round in 0..3 {
        harness.put("lib/b.js", &format!("let b = {};", round), 200 + round);
        writer.write(harness.input.path(), harness.dest.path()).await.unwrap();
        // Replay without changes
        writer.write(harness.input.path(), harness.dest.path()).await.unwrap();

        let cache = BuildHarness::snapshot(writer.cache_dir().unwrap());
        let dest = BuildHarness::snapshot(harness.dest.path());
        assert_eq!(cache, dest);
    }

    assert_eq!(harness.rebuild_count(), 3);
}

#[tokio::test]
async fn test_filter_from_json_config() {
    let harness = BuildHarness::new();
    harness.put("src/app.js", "app", 100);
    harness.put("src/app.js.map", "map", 100);
    harness.put("vendor/jquery.js", "$", 100);

    let config = WriterConfig::from_json_str(
        r#"{
            "name": "js",
            "filter": {
                "include": ["\\.js$"],
                "exclude": [{ "glob": "**/vendor/**" }]
            }
        }"#,
    )
    .unwrap();
    let mut writer = harness.bundler(CachingWriterBuilder::from_config(config));
    writer.write(harness.input.path(), harness.dest.path()).await.unwrap();

    // Neither a source map nor a vendored file triggers a rebuild
    harness.put("src/app.js.map", "new map", 300);
    harness.put("vendor/jquery.js", "$$", 300);
    let outcome = writer.write(harness.input.path(), harness.dest.path()).await.unwrap();
    assert!(!outcome.rebuilt);

    // An included file does
    harness.put("src/app.js", "app v2", 300);
    let outcome = writer.write(harness.input.path(), harness.dest.path()).await.unwrap();
    assert!(outcome.rebuilt);
    assert_eq!(harness.rebuild_count(), 2);
}

#[tokio::test]
async fn test_async_resolver() {
    let harness = BuildHarness::new();
    harness.put("x.txt", "x", 100);
    let mut writer = harness.bundler(CachingWriterBuilder::new());

    let resolver = DeferredInput(harness.input.path().to_path_buf());
    let outcome = writer.write(&resolver, harness.dest.path()).await.unwrap();

    assert!(outcome.rebuilt);
    let bundle = fs::read_to_string(harness.dest.path().join("assets/bundle.txt")).unwrap();
    assert!(bundle.contains("// x.txt"));
}

#[tokio::test]
async fn test_failing_resolver_skips_everything() {
    struct Broken;

    #[async_trait]
    impl InputResolver for Broken {
        async fn resolve(&self) -> Result<PathBuf> {
            Err(TreeCacheError::input("upstream tree failed to build"))
        }
    }

    let harness = BuildHarness::new();
    fs::write(harness.dest.path().join("untouched"), "still here").unwrap();
    let mut writer = harness.bundler(CachingWriterBuilder::new());

    let err = writer.write(&Broken, harness.dest.path()).await.unwrap_err();

    assert!(matches!(err, TreeCacheError::InputResolution(_)));
    assert_eq!(harness.rebuild_count(), 0);
    assert!(harness.dest.path().join("untouched").exists());
}

#[tokio::test]
async fn test_partial_output_of_failed_rebuild_is_served() {
    let harness = BuildHarness::new();
    harness.put("in.txt", "data", 100);

    let mut writer = CachingWriterBuilder::new()
        .cache_root(harness.cache_root.path())
        .link_mode(LinkMode::Copy)
        .build(RebuildFn::new(|_: &Path, cache: &Path| {
            fs::write(cache.join("half.txt"), "partial")?;
            Err(anyhow::anyhow!("linker ran out of memory").into())
        }))
        .unwrap();

    let err = writer.write(harness.input.path(), harness.dest.path()).await.unwrap_err();
    assert!(err.is_rebuild_failure());
    assert_eq!(
        fs::read_to_string(harness.dest.path().join("half.txt")).unwrap(),
        "partial"
    );

    // The digest did not advance, so the same input is tried again
    assert!(writer.cache_digest().is_none());
    assert!(writer.write(harness.input.path(), harness.dest.path()).await.is_err());
}

#[tokio::test]
async fn test_writers_do_not_share_cache_slots() {
    let harness = BuildHarness::new();
    harness.put("a.txt", "a", 100);
    let other_dest = TempDir::new().unwrap();

    let mut first = harness.bundler(CachingWriterBuilder::new().name("first"));
    let mut second = harness.bundler(CachingWriterBuilder::new().name("second"));
    first.write(harness.input.path(), harness.dest.path()).await.unwrap();
    second.write(harness.input.path(), other_dest.path()).await.unwrap();

    assert_ne!(first.cache_dir().unwrap(), second.cache_dir().unwrap());
    assert_eq!(harness.rebuild_count(), 2);

    let released = first.cache_dir().unwrap().to_path_buf();
    drop(first);
    assert!(!released.exists());
    assert!(second.cache_dir().unwrap().exists());
}
