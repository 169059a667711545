use serde::Serialize;

use crate::analysis::Category;
use crate::database::Timestamp;

/// Where an object sits in its lifecycle. Each trigger moves one object
/// forward by one or more steps; nothing here is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Uploaded,
    Analyzed,
    Rejected,
    Admitted,
    /// A derivative was requested for a name without a record.
    Unrecorded,
    ThumbnailPending,
    Thumbnailed,
    CollagePending,
    Composed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    Recorded { created: Timestamp },
    /// Redelivery of an event that was already handled.
    AlreadyRecorded,
    Rejected { flagged: Vec<Category> },
}

impl UploadOutcome {
    pub fn stage(&self) -> Stage {
        match self {
            UploadOutcome::Recorded { .. } | UploadOutcome::AlreadyRecorded => Stage::Admitted,
            UploadOutcome::Rejected { .. } => Stage::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ThumbnailOutcome {
    Uploaded {
        bucket: String,
        name: String,
        width: u32,
        height: u32,
    },
    /// Rejected by the safety gate or not analyzed yet. Nothing was written.
    NotAdmitted,
}

impl ThumbnailOutcome {
    pub fn stage(&self) -> Stage {
        match self {
            ThumbnailOutcome::Uploaded { .. } => Stage::Thumbnailed,
            ThumbnailOutcome::NotAdmitted => Stage::Unrecorded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CollageOutcome {
    Composed {
        /// Record names in tile order, newest first.
        sources: Vec<String>,
        width: u32,
        height: u32,
    },
    Skipped { available: usize },
}

impl CollageOutcome {
    pub fn stage(&self) -> Stage {
        match self {
            CollageOutcome::Composed { .. } => Stage::Composed,
            CollageOutcome::Skipped { .. } => Stage::Skipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessOutcome {
    pub thumbnail: ThumbnailOutcome,
    /// Not attempted when no thumbnail was derived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collage: Option<CollageOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Handled {
    Upload(UploadOutcome),
    Process(ProcessOutcome),
}

impl Handled {
    pub fn stage(&self) -> Stage {
        match self {
            Handled::Upload(outcome) => outcome.stage(),
            Handled::Process(outcome) => outcome
                .collage
                .as_ref()
                .map_or_else(|| outcome.thumbnail.stage(), CollageOutcome::stage),
        }
    }
}
