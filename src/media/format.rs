use std::path::Path;

use image::{DynamicImage, ImageFormat, ImageReader};

use crate::media::RenderError;

/// Sniff the image format from the file's magic bytes.
pub fn detect_format(path: &Path) -> Result<ImageFormat, RenderError> {
    let kind = infer::get_from_path(path)
        .map_err(|source| RenderError::Io { path: path.to_path_buf(), source })?;

    let mime = match kind {
        Some(k) => k.mime_type(),
        None => "application/octet-stream",
    };

    ImageFormat::from_mime_type(mime)
        .ok_or_else(|| RenderError::UnsupportedFormat { mime: mime.to_string() })
}

/// Decode a working file in its sniffed format.
pub fn decode(path: &Path) -> Result<(DynamicImage, ImageFormat), RenderError> {
    let format = detect_format(path)?;
    let mut reader = ImageReader::open(path)
        .map_err(|source| RenderError::Io { path: path.to_path_buf(), source })?;
    reader.set_format(format);
    let image = reader
        .decode()
        .map_err(|source| RenderError::Image { path: path.to_path_buf(), source })?;
    Ok((image, format))
}

pub fn encode(image: &DynamicImage, path: &Path, format: ImageFormat) -> Result<(), RenderError> {
    image
        .save_with_format(path, format)
        .map_err(|source| RenderError::Image { path: path.to_path_buf(), source })
}
