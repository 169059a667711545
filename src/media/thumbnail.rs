use std::path::PathBuf;

use image::{DynamicImage, GenericImageView, ImageFormat};
use tracing::debug;

use crate::media::format;
use crate::media::workdir::WorkDir;
use crate::media::RenderError;

pub const THUMBNAIL_EDGE: u32 = 400;

#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

/// Produces bounded-size derivatives, re-encoded in the source format.
#[derive(Debug, Clone)]
pub struct ThumbnailDeriver {
    work_root: PathBuf,
    edge: u32,
}

impl ThumbnailDeriver {
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self { work_root: work_root.into(), edge: THUMBNAIL_EDGE }
    }

    pub fn derive(&self, name: &str, original: &[u8]) -> Result<Thumbnail, RenderError> {
        let work = WorkDir::acquire(&self.work_root, name)?;
        let source = work.write("original", original)?;

        let (image, format) = format::decode(&source)?;
        let (src_w, src_h) = image.dimensions();
        let resized = fit_within(image, self.edge);

        let target = work.file("thumbnail");
        format::encode(&resized, &target, format)?;
        let bytes = work.read("thumbnail")?;

        debug!(name, ?format, src_w, src_h, width = resized.width(), height = resized.height(), "Rendered thumbnail");
        Ok(Thumbnail { bytes, width: resized.width(), height: resized.height(), format })
    }
}

/// Scale down, keeping aspect ratio, until both sides fit in `edge`.
/// Images already inside the box are returned untouched.
pub fn fit_within(image: DynamicImage, edge: u32) -> DynamicImage {
    if image.width() <= edge && image.height() <= edge {
        image
    } else {
        image.thumbnail(edge, edge)
    }
}
