//! Picture derivative pipeline: analysis and safety gating of uploads,
//! thumbnail derivation, and 2x2 collage composition, coordinated through a
//! create-once record store.

pub mod analysis;
pub mod database;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod storage;
pub mod utils;

pub use error::{response_status, PipelineError, SUCCESS_STATUS};
pub use pipeline::Pipeline;
