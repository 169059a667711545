use std::path::{Path, PathBuf};

use image::{imageops, DynamicImage, ImageFormat, RgbaImage};
use rayon::prelude::*;
use tracing::debug;

use crate::media::format;
use crate::media::workdir::WorkDir;
use crate::media::RenderError;

/// Fixed destination of the current collage in the derivative bucket.
pub const COLLAGE_NAME: &str = "collage.png";
/// Number of thumbnails in a collage.
pub const QUORUM: usize = 4;
/// Minimum working canvas edge; unused area stays transparent and is trimmed.
pub const CANVAS_EDGE: u32 = 400;

#[derive(Debug, Clone)]
pub struct Collage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// 2x2 tiling of the newest thumbnails into one PNG.
#[derive(Debug, Clone)]
pub struct CollageComposer {
    work_root: PathBuf,
}

impl CollageComposer {
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self { work_root: work_root.into() }
    }

    /// `tiles` are encoded images in newest-first order: 0 and 1 form the top
    /// row, 2 and 3 the bottom row.
    pub fn compose(&self, tiles: &[Vec<u8>]) -> Result<Collage, RenderError> {
        if tiles.len() != QUORUM {
            return Err(RenderError::TileCount { expected: QUORUM, actual: tiles.len() });
        }

        let work = WorkDir::acquire(&self.work_root, COLLAGE_NAME)?;
        let paths = tiles
            .iter()
            .enumerate()
            .map(|(i, bytes)| work.write(&format!("tile-{i}"), bytes))
            .collect::<Result<Vec<_>, _>>()?;

        let decoded: [RgbaImage; QUORUM] = paths
            .par_iter()
            .map(|path| decode_tile(path))
            .collect::<Result<Vec<_>, _>>()?
            .try_into()
            .map_err(|rest: Vec<RgbaImage>| RenderError::TileCount { expected: QUORUM, actual: rest.len() })?;

        let composed = trim(layout(&decoded));
        let (width, height) = composed.dimensions();

        let target = work.file(COLLAGE_NAME);
        format::encode(&DynamicImage::ImageRgba8(composed), &target, ImageFormat::Png)?;
        let bytes = work.read(COLLAGE_NAME)?;

        debug!(width, height, size = bytes.len(), "Rendered collage");
        Ok(Collage { bytes, width, height })
    }
}

fn decode_tile(path: &Path) -> Result<RgbaImage, RenderError> {
    let (image, _) = format::decode(path)?;
    Ok(image.to_rgba8())
}

/// Two rows appended left to right and top-aligned, stacked left-aligned on
/// a transparent canvas of at least `CANVAS_EDGE` on each side.
fn layout(tiles: &[RgbaImage; QUORUM]) -> RgbaImage {
    let (top_w, top_h) = row_size(&tiles[0], &tiles[1]);
    let (bottom_w, bottom_h) = row_size(&tiles[2], &tiles[3]);

    let width = CANVAS_EDGE.max(top_w).max(bottom_w);
    let height = CANVAS_EDGE.max(top_h + bottom_h);
    let mut canvas = RgbaImage::new(width, height);

    let top = i64::from(top_h);
    imageops::replace(&mut canvas, &tiles[0], 0, 0);
    imageops::replace(&mut canvas, &tiles[1], i64::from(tiles[0].width()), 0);
    imageops::replace(&mut canvas, &tiles[2], 0, top);
    imageops::replace(&mut canvas, &tiles[3], i64::from(tiles[2].width()), top);
    canvas
}

fn row_size(left: &RgbaImage, right: &RgbaImage) -> (u32, u32) {
    (left.width() + right.width(), left.height().max(right.height()))
}

/// Smallest `(x, y, width, height)` holding every pixel with non-zero alpha.
pub fn opaque_bounds(image: &RgbaImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel[3] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds.map(|(x0, y0, x1, y1)| (x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// Crop to the opaque content. A fully transparent canvas is kept as is.
pub fn trim(image: RgbaImage) -> RgbaImage {
    match opaque_bounds(&image) {
        Some((x, y, w, h)) => imageops::crop_imm(&image, x, y, w, h).to_image(),
        None => image,
    }
}
