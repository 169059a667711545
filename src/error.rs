use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::database::StoreError;
use crate::media::RenderError;
use crate::storage::{BucketError, ObjectRef};

/// Status reported to the delivering transport for every successful run,
/// including runs that ended in a rejection or a skipped collage.
pub const SUCCESS_STATUS: u16 = 204;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    #[error("analysis of {object} failed")]
    Analysis {
        object: ObjectRef,
        #[source]
        source: AnalysisError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Bucket(#[from] BucketError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl PipelineError {
    /// HTTP-style status for the transport: the caller's input is at fault for
    /// 4xx, anything external or rendering related is 5xx and worth redelivery.
    pub fn status(&self) -> u16 {
        match self {
            PipelineError::MalformedEvent(_) => 400,
            _ => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.status() >= 500
    }
}

/// Map any pipeline result to the status the transport should see.
pub fn response_status<T>(result: &Result<T, PipelineError>) -> u16 {
    match result {
        Ok(_) => SUCCESS_STATUS,
        Err(err) => err.status(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let ok: Result<(), PipelineError> = Ok(());
        assert_eq!(response_status(&ok), 204);

        let malformed: Result<(), _> = Err(PipelineError::MalformedEvent("no name".into()));
        assert_eq!(response_status(&malformed), 400);

        let missing = PipelineError::Bucket(BucketError::NotFound {
            bucket: "thumbnails".into(),
            name: "a.png".into(),
        });
        assert_eq!(missing.status(), 500);
        assert!(missing.is_retryable());
    }
}
