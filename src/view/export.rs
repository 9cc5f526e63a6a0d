//! Rendered image export.

use super::viewport::TempView;
use crate::error::PersistenceError;
use image::ImageFormat;
use std::path::Path;
use tracing::info;

/// Format for `path`, chosen by extension; PNG when unrecognized.
pub fn format_for(path: &Path) -> ImageFormat {
    match ImageFormat::from_path(path) {
        Ok(format @ (ImageFormat::Png
        | ImageFormat::Jpeg
        | ImageFormat::Bmp
        | ImageFormat::Tiff
        | ImageFormat::Pnm)) => format,
        _ => ImageFormat::Png,
    }
}

/// Render `view` for a `width` x `height` viewport and write it to `path`.
///
/// The highlight cursor is cleared first so the image shows data only.
pub fn export_image(
    view: &mut TempView,
    path: &Path,
    width: u32,
    height: u32,
) -> Result<(), PersistenceError> {
    view.set_highlight(None);
    let pixmap = view
        .refresh_view(width, height)
        .ok_or(PersistenceError::NoData)?;
    let format = format_for(path);
    pixmap.save_with_format(path, format)?;
    info!(path = %path.display(), ?format, "Image exported");
    Ok(())
}
