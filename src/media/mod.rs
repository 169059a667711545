pub mod collage;
pub mod format;
pub mod thumbnail;
pub mod workdir;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use collage::{Collage, CollageComposer};
pub use thumbnail::{Thumbnail, ThumbnailDeriver};
pub use workdir::WorkDir;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("working file I/O failed at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unsupported image format ({mime})")]
    UnsupportedFormat { mime: String },
    #[error("cannot decode or encode {path:?}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("collage needs exactly {expected} tiles, got {actual}")]
    TileCount { expected: usize, actual: usize },
}
