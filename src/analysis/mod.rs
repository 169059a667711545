pub mod gate;
pub mod interpret;
pub mod palette;
pub mod result;
pub mod service;
pub mod wire;

pub use result::{AnalysisResult, Category, ColorScore, LabelAnnotation, Likelihood, Rgb, SafeSearch};
pub use service::{AnalysisError, AnalysisService};
