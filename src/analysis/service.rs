use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::analysis::result::AnalysisResult;
use crate::analysis::wire::AnnotateImageResponse;
use crate::storage::{BucketError, ObjectRef};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no annotation available for {0}")]
    Missing(ObjectRef),
    #[error("analysis service error {code}: {message}")]
    Service { code: i32, message: String },
    #[error("failed to read annotation {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed annotation {path:?}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Bucket(#[from] BucketError),
    #[error("cannot decode image {object}")]
    Image {
        object: ObjectRef,
        #[source]
        source: image::ImageError,
    },
}

/// The external vision capability: labels, colors and safety scores for one
/// stored object. Calls block until the service answers or fails.
pub trait AnalysisService: Send + Sync {
    fn annotate(&self, object: &ObjectRef) -> Result<AnalysisResult, AnalysisError>;
}

/// Reads annotations captured from a vision service, one JSON document per
/// object at `<root>/<bucket>/<name>.json`.
#[derive(Debug, Clone)]
pub struct SidecarAnalyzer {
    root: PathBuf,
}

impl SidecarAnalyzer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn sidecar_path(&self, object: &ObjectRef) -> PathBuf {
        self.root
            .join(&object.bucket)
            .join(format!("{}.json", object.name))
    }
}

impl AnalysisService for SidecarAnalyzer {
    fn annotate(&self, object: &ObjectRef) -> Result<AnalysisResult, AnalysisError> {
        let path = self.sidecar_path(object);
        let raw = fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => AnalysisError::Missing(object.clone()),
            _ => AnalysisError::Io { path: path.clone(), source },
        })?;
        debug!(object = %object, path = ?path, "Loaded annotation sidecar");
        decode(&path, &raw)
    }
}

fn decode(path: &Path, raw: &[u8]) -> Result<AnalysisResult, AnalysisError> {
    let response: AnnotateImageResponse = serde_json::from_slice(raw)
        .map_err(|source| AnalysisError::Decode { path: path.to_path_buf(), source })?;
    response
        .into_result()
        .map_err(|status| AnalysisError::Service { code: status.code, message: status.message })
}
