pub mod event;
pub mod orchestrator;
pub mod outcome;

pub use event::{TriggerEvent, TriggerKind};
pub use orchestrator::Pipeline;
pub use outcome::{CollageOutcome, Handled, ProcessOutcome, Stage, ThumbnailOutcome, UploadOutcome};
