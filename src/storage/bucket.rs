use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// A named object inside a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self { bucket: bucket.into(), name: name.into() }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.name)
    }
}

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("object '{name}' not found in bucket '{bucket}'")]
    NotFound { bucket: String, name: String },
    #[error("invalid bucket or object name: {0:?}")]
    InvalidName(String),
    #[error("I/O failure on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Blob storage addressed by `(bucket, name)`. Originals and derivatives use
/// the same shape in different buckets.
pub trait ObjectStore: Send + Sync {
    fn get(&self, bucket: &str, name: &str) -> Result<Vec<u8>, BucketError>;

    /// Replace the object atomically: readers see the old bytes or the new
    /// bytes, never a partial write.
    fn put(&self, bucket: &str, name: &str, bytes: &[u8]) -> Result<(), BucketError>;

    /// Object names in the bucket, sorted. A missing bucket is empty.
    fn list(&self, bucket: &str) -> Result<Vec<String>, BucketError>;
}

/// Buckets are directories under `root`; object names may contain `/`.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, BucketError> {
        if bucket.contains('/') {
            return Err(BucketError::InvalidName(bucket.to_string()));
        }
        check_relative(bucket)?;
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, name: &str) -> Result<PathBuf, BucketError> {
        let dir = self.bucket_dir(bucket)?;
        check_relative(name)?;
        Ok(dir.join(name))
    }
}

/// Reject anything that could escape the bucket directory or collide with the
/// hidden temp files used by `put`.
fn check_relative(name: &str) -> Result<(), BucketError> {
    let valid = !name.is_empty()
        && !Path::new(name).has_root()
        && name.split('/').all(|part| !part.is_empty() && !part.starts_with('.'));
    if valid {
        Ok(())
    } else {
        Err(BucketError::InvalidName(name.to_string()))
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

impl ObjectStore for FsObjectStore {
    fn get(&self, bucket: &str, name: &str) -> Result<Vec<u8>, BucketError> {
        let path = self.object_path(bucket, name)?;
        fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => BucketError::NotFound {
                bucket: bucket.to_string(),
                name: name.to_string(),
            },
            _ => BucketError::Io { path, source },
        })
    }

    fn put(&self, bucket: &str, name: &str, bytes: &[u8]) -> Result<(), BucketError> {
        let path = self.object_path(bucket, name)?;
        let parent = path.parent().unwrap_or(&self.root).to_path_buf();
        let io_err = |source| BucketError::Io { path: parent.clone(), source };

        fs::create_dir_all(&parent).map_err(io_err)?;
        // Same directory as the destination so the rename never crosses devices.
        let mut staged = NamedTempFile::new_in(&parent).map_err(io_err)?;
        staged.write_all(bytes).map_err(io_err)?;
        staged.as_file().sync_all().map_err(io_err)?;
        staged
            .persist(&path)
            .map_err(|e| BucketError::Io { path: path.clone(), source: e.error })?;
        Ok(())
    }

    fn list(&self, bucket: &str) -> Result<Vec<String>, BucketError> {
        let dir = self.bucket_dir(bucket)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(&dir).into_iter().filter_entry(|e| !is_hidden(e)) {
            let entry = entry.map_err(|e| BucketError::Io {
                path: dir.clone(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&dir) {
                let name: Vec<_> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                names.push(name.join("/"));
            }
        }
        names.sort();
        Ok(names)
    }
}
