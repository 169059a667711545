use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::debug;

use crate::media::RenderError;

/// A private working directory for one derivation call.
///
/// The directory and everything written into it are removed when the guard
/// drops, on success and on every early return alike. Two invocations for the
/// same key never share a directory.
pub struct WorkDir {
    dir: TempDir,
}

impl WorkDir {
    pub fn acquire(base: &Path, key: &str) -> Result<Self, RenderError> {
        fs::create_dir_all(base).map_err(|source| RenderError::Io {
            path: base.to_path_buf(),
            source,
        })?;
        let prefix = format!("{}-", &fingerprint(key)[..16]);
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(base)
            .map_err(|source| RenderError::Io { path: base.to_path_buf(), source })?;
        debug!(key, path = ?dir.path(), "Acquired working directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, RenderError> {
        let path = self.file(name);
        fs::write(&path, bytes).map_err(|source| RenderError::Io { path: path.clone(), source })?;
        Ok(path)
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>, RenderError> {
        let path = self.file(name);
        fs::read(&path).map_err(|source| RenderError::Io { path, source })
    }
}

/// Hex SHA-256 of an object name; object names may hold `/` and other
/// characters unfit for a directory name.
pub fn fingerprint(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_removed_on_drop() -> Result<()> {
        let base = tempfile::tempdir()?;
        let path = {
            let work = WorkDir::acquire(base.path(), "nested/name.jpg")?;
            work.write("original", b"bytes")?;
            assert_eq!(work.read("original")?, b"bytes");
            work.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(fs::read_dir(base.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_same_key_gets_separate_dirs() -> Result<()> {
        let base = tempfile::tempdir()?;
        let a = WorkDir::acquire(base.path(), "cat.jpg")?;
        let b = WorkDir::acquire(base.path(), "cat.jpg")?;
        assert_ne!(a.path(), b.path());
        Ok(())
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let fp = fingerprint("cat.jpg");
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, fingerprint("cat.jpg"));
        assert_ne!(fp, fingerprint("dog.jpg"));
    }
}
