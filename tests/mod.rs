//! Main test module for treecache
//!
//! This module includes all test suites:
//! - Integration tests for multi-cycle build scenarios
//! - Chaos tests for trees that change underneath a walk
//! - Property-based tests for fingerprint invariants

pub mod integration;
pub mod chaos;

#[cfg(test)]
mod edge_cases {
    use ::treecache::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn copy_tree(input: &Path, cache: &Path) -> Result<()> {
        for relative in utils::list_relative_paths(input)? {
            let from = input.join(&relative);
            if from.is_file() {
                let to = cache.join(&relative);
                utils::ensure_dir(to.parent().unwrap())?;
                fs::copy(&from, &to)?;
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_input() {
        let input = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let cache_root = TempDir::new().unwrap();

        let mut writer = CachingWriterBuilder::new()
            .cache_root(cache_root.path())
            .build(RebuildFn::new(copy_tree))
            .unwrap();

        let outcome = writer.write(input.path(), dest.path()).await.unwrap();
        assert!(outcome.rebuilt);
        assert_eq!(outcome.materialized.files(), 0);
        assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);

        // Adding an empty directory is still a change
        fs::create_dir(input.path().join("empty")).unwrap();
        let outcome = writer.write(input.path(), dest.path()).await.unwrap();
        assert!(outcome.rebuilt);
    }

    #[tokio::test]
    async fn test_missing_input_directory() {
        let root = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let missing = root.path().join("not-yet-built");

        let mut writer = CachingWriterBuilder::new()
            .cache_root(root.path().join("cache"))
            .build(RebuildFn::new(|_: &Path, _: &Path| Ok(())))
            .unwrap();

        // A missing input fingerprints as a sentinel rather than failing
        let first = writer.write(&missing, dest.path()).await.unwrap();
        let second = writer.write(&missing, dest.path()).await.unwrap();
        assert!(first.rebuilt);
        assert!(!second.rebuilt);

        fs::create_dir(&missing).unwrap();
        let third = writer.write(&missing, dest.path()).await.unwrap();
        assert!(third.rebuilt);
    }

    #[tokio::test]
    async fn test_special_filenames() {
        let input = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let cache_root = TempDir::new().unwrap();

        let special_names = vec![
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file.with.dots.txt",
            "file@with#special$chars.txt",
            "file[with]brackets.txt",
            "файл.txt",
            "文件.txt",
        ];

        let mut created = Vec::new();
        for name in &special_names {
            if fs::write(input.path().join(name), format!("Content of {}", name)).is_ok() {
                created.push(*name);
            }
        }

        let mut writer = CachingWriterBuilder::new()
            .cache_root(cache_root.path())
            .build(RebuildFn::new(copy_tree))
            .unwrap();
        writer.write(input.path(), dest.path()).await.unwrap();

        for name in &created {
            let content = fs::read_to_string(dest.path().join(name)).unwrap();
            assert_eq!(content, format!("Content of {}", name));
        }
    }

    #[test]
    fn test_fingerprint_without_writer() {
        let input = TempDir::new().unwrap();
        fs::write(input.path().join("one"), "1").unwrap();

        let filter = PathFilter::default();
        let fingerprint = TreeFingerprinter::new(&filter).fingerprint(input.path());

        assert_eq!(fingerprint.files, 1);
        assert_eq!(fingerprint.digest().len(), 64);
    }
}
