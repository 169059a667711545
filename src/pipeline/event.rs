use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::media::collage::COLLAGE_NAME;
use crate::storage::ObjectRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// A new object landed in the uploads bucket.
    Upload,
    /// Derivatives were requested for an object.
    Process,
}

/// One line of an event stream: `{"trigger": "upload", "bucket": ..., "name": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub trigger: TriggerKind,
    #[serde(flatten)]
    pub object: ObjectRef,
}

impl TriggerEvent {
    pub fn new(trigger: TriggerKind, object: ObjectRef) -> Self {
        Self { trigger, object }
    }

    pub fn parse(raw: &[u8]) -> Result<Self, PipelineError> {
        let event: TriggerEvent = serde_json::from_slice(raw)
            .map_err(|e| PipelineError::MalformedEvent(e.to_string()))?;
        validate(&event.object)?;
        Ok(event)
    }
}

/// Decode the `{ "bucket": ..., "name": ... }` payload both triggers carry.
pub fn parse_object(raw: &[u8]) -> Result<ObjectRef, PipelineError> {
    let object: ObjectRef = serde_json::from_slice(raw)
        .map_err(|e| PipelineError::MalformedEvent(e.to_string()))?;
    validate(&object)?;
    Ok(object)
}

pub fn validate(object: &ObjectRef) -> Result<(), PipelineError> {
    if object.bucket.trim().is_empty() {
        return Err(PipelineError::MalformedEvent("bucket is empty".to_string()));
    }
    if object.name.trim().is_empty() {
        return Err(PipelineError::MalformedEvent("name is empty".to_string()));
    }
    // Thumbnails share the derivative bucket with the collage, keyed by name.
    if object.name == COLLAGE_NAME {
        return Err(PipelineError::MalformedEvent(format!("name '{COLLAGE_NAME}' is reserved")));
    }
    Ok(())
}
