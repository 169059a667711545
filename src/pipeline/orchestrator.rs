use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::analysis::interpret::interpret;
use crate::analysis::{gate, AnalysisService};
use crate::database::{CreateOutcome, RecordStore};
use crate::error::PipelineError;
use crate::media::collage::{COLLAGE_NAME, QUORUM};
use crate::media::{CollageComposer, ThumbnailDeriver};
use crate::pipeline::event::{self, TriggerEvent, TriggerKind};
use crate::pipeline::outcome::{
    CollageOutcome, Handled, ProcessOutcome, Stage, ThumbnailOutcome, UploadOutcome,
};
use crate::storage::{ObjectRef, ObjectStore};

/// Drives one object through the next eligible transition per trigger.
///
/// Two independent entry points exist: [`Pipeline::handle_upload`] for new
/// objects and [`Pipeline::handle_processing`] for derivative requests. Both
/// run to completion on the calling thread and never retry; failures go back
/// to the caller so the delivering transport can redeliver.
pub struct Pipeline {
    analyzer: Arc<dyn AnalysisService>,
    records: Arc<dyn RecordStore>,
    originals: Arc<dyn ObjectStore>,
    derivatives: Arc<dyn ObjectStore>,
    derivative_bucket: String,
    thumbnails: ThumbnailDeriver,
    collages: CollageComposer,
}

impl Pipeline {
    pub fn new(
        analyzer: Arc<dyn AnalysisService>,
        records: Arc<dyn RecordStore>,
        originals: Arc<dyn ObjectStore>,
        derivatives: Arc<dyn ObjectStore>,
        derivative_bucket: impl Into<String>,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        let work_root = work_root.into();
        Self {
            analyzer,
            records,
            originals,
            derivatives,
            derivative_bucket: derivative_bucket.into(),
            thumbnails: ThumbnailDeriver::new(work_root.clone()),
            collages: CollageComposer::new(work_root),
        }
    }

    pub fn dispatch(&self, trigger: &TriggerEvent) -> Result<Handled, PipelineError> {
        match trigger.trigger {
            TriggerKind::Upload => self.handle_upload(&trigger.object).map(Handled::Upload),
            TriggerKind::Process => self.handle_processing(&trigger.object).map(Handled::Process),
        }
    }

    /// Uploaded → Analyzed → Rejected | Admitted.
    pub fn handle_upload(&self, object: &ObjectRef) -> Result<UploadOutcome, PipelineError> {
        event::validate(object)?;
        info!(object = %object, stage = ?Stage::Uploaded, "New picture uploaded");

        let result = self.analyzer.annotate(object).map_err(|source| {
            error!(object = %object, error = %source, "Failed to annotate image");
            PipelineError::Analysis { object: object.clone(), source }
        })?;
        if let Ok(raw) = serde_json::to_string(&result) {
            debug!(object = %object, raw = %raw, "Raw analysis output");
        }

        let interpretation = interpret(&result);
        info!(
            object = %object,
            stage = ?Stage::Analyzed,
            labels = %interpretation.labels.join(", "),
            color = %interpretation.color,
            safe = interpretation.safe,
            "Picture analyzed"
        );

        if !interpretation.safe {
            let flagged = gate::flagged(&result.safe_search);
            warn!(object = %object, stage = ?Stage::Rejected, ?flagged, "Picture rejected by safety gate");
            return Ok(UploadOutcome::Rejected { flagged });
        }

        let created = self
            .records
            .create_if_absent(&object.name, &interpretation.labels, &interpretation.color)
            .inspect_err(|e| error!(object = %object, error = %e, "Failed to add picture record"))?;

        match created {
            CreateOutcome::Created(timestamp) => {
                info!(object = %object, stage = ?Stage::Admitted, created = timestamp.0, "Picture metadata saved");
                Ok(UploadOutcome::Recorded { created: timestamp })
            }
            CreateOutcome::AlreadyExists => {
                info!(object = %object, stage = ?Stage::Admitted, "Picture already recorded, nothing to do");
                Ok(UploadOutcome::AlreadyRecorded)
            }
        }
    }

    /// ThumbnailPending → Thumbnailed, then the collage quorum check.
    pub fn handle_processing(&self, object: &ObjectRef) -> Result<ProcessOutcome, PipelineError> {
        let thumbnail = self.derive_thumbnail(object)?;
        if thumbnail == ThumbnailOutcome::NotAdmitted {
            return Ok(ProcessOutcome { thumbnail, collage: None });
        }
        let collage = self.compose_collage()?;
        Ok(ProcessOutcome { thumbnail, collage: Some(collage) })
    }

    /// Only pictures with a record get a thumbnail, so nothing is derived
    /// from content the safety gate turned away.
    pub fn derive_thumbnail(&self, object: &ObjectRef) -> Result<ThumbnailOutcome, PipelineError> {
        event::validate(object)?;
        let record = self
            .records
            .get(&object.name)
            .inspect_err(|e| error!(object = %object, error = %e, "Failed to look up picture record"))?;
        if record.is_none() {
            warn!(object = %object, stage = ?Stage::Unrecorded, "No picture record, skipping thumbnail");
            return Ok(ThumbnailOutcome::NotAdmitted);
        }
        info!(object = %object, stage = ?Stage::ThumbnailPending, "Deriving thumbnail");

        let original = self
            .originals
            .get(&object.bucket, &object.name)
            .inspect_err(|e| error!(object = %object, error = %e, "Failed to download original"))?;
        let thumbnail = self
            .thumbnails
            .derive(&object.name, &original)
            .inspect_err(|e| error!(object = %object, error = %e, "Failed to render thumbnail"))?;
        self.derivatives
            .put(&self.derivative_bucket, &object.name, &thumbnail.bytes)
            .inspect_err(|e| error!(object = %object, error = %e, "Failed to upload thumbnail"))?;

        info!(
            object = %object,
            stage = ?Stage::Thumbnailed,
            bucket = %self.derivative_bucket,
            width = thumbnail.width,
            height = thumbnail.height,
            "Uploaded thumbnail"
        );
        Ok(ThumbnailOutcome::Uploaded {
            bucket: self.derivative_bucket.clone(),
            name: object.name.clone(),
            width: thumbnail.width,
            height: thumbnail.height,
        })
    }

    /// CollagePending → Composed | Skipped. Composes only when exactly
    /// [`QUORUM`] recent records come back; the output depends solely on
    /// which records those are.
    pub fn compose_collage(&self) -> Result<CollageOutcome, PipelineError> {
        let recent = self
            .records
            .most_recent(QUORUM)
            .inspect_err(|e| error!(error = %e, "Failed to get last pictures"))?;

        if recent.len() != QUORUM {
            info!(stage = ?Stage::Skipped, available = recent.len(), "Not enough pictures for a collage");
            return Ok(CollageOutcome::Skipped { available: recent.len() });
        }
        info!(stage = ?Stage::CollagePending, "Collage quorum reached");

        let mut tiles = Vec::with_capacity(QUORUM);
        for record in &recent {
            let bytes = self
                .derivatives
                .get(&self.derivative_bucket, &record.name)
                .inspect_err(|e| error!(name = %record.name, error = %e, "Failed to download thumbnail"))?;
            tiles.push(bytes);
        }
        debug!("Downloaded all thumbnails");

        let collage = self
            .collages
            .compose(&tiles)
            .inspect_err(|e| error!(error = %e, "Failed to create collage"))?;
        self.derivatives
            .put(&self.derivative_bucket, COLLAGE_NAME, &collage.bytes)
            .inspect_err(|e| error!(error = %e, "Failed to upload collage"))?;

        let sources: Vec<String> = recent.into_iter().map(|r| r.name).collect();
        info!(
            stage = ?Stage::Composed,
            bucket = %self.derivative_bucket,
            sources = %sources.join(", "),
            width = collage.width,
            height = collage.height,
            "Uploaded collage"
        );
        Ok(CollageOutcome::Composed { sources, width: collage.width, height: collage.height })
    }
}
