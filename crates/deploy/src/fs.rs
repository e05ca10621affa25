//! File system utils.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use anyhow::Context;
use fs2::FileExt;

pub struct FsHandler;

impl FsHandler {
    /// Write `contents` to `path` through a sibling temp file and a rename.
    ///
    /// Readers never observe a half-written file.
    pub fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        let tmp_path = Self::sibling(path, "tmp");

        std::fs::write(&tmp_path, contents)
            .with_context(|| format!("Failed to write temp file {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to move {} over {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        tracing::trace!(path = %path.display(), bytes = contents.len(), "File written");

        Ok(())
    }

    /// Take an exclusive advisory lock on `<path>.lock`.
    ///
    /// The lock is released when the returned file is dropped. Fails immediately
    /// if another process holds it.
    pub fn lock_exclusive(path: &Path) -> anyhow::Result<File> {
        let lock_path = Self::sibling(path, "lock");

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

        file.try_lock_exclusive().with_context(|| {
            format!(
                "{} is locked, is another deployment running against it?",
                path.display()
            )
        })?;

        tracing::debug!(lock = %lock_path.display(), "Acquired ledger lock");

        Ok(file)
    }

    // `contracts.json` -> `contracts.json.<suffix>`
    fn sibling(path: &Path, suffix: &str) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_write_atomic_replaces_contents() {
        let temp_dir = TempDir::new("chainship-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("contracts.json");
        std::fs::write(&path, "old").unwrap();

        FsHandler::write_atomic(&path, b"new").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert!(!temp_dir.path().join("contracts.json.tmp").exists());
    }

    #[test]
    fn test_lock_is_exclusive() {
        let temp_dir = TempDir::new("chainship-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("contracts.json");

        let held = FsHandler::lock_exclusive(&path).unwrap();
        assert!(FsHandler::lock_exclusive(&path).is_err());

        drop(held);
        assert!(FsHandler::lock_exclusive(&path).is_ok());
    }
}
