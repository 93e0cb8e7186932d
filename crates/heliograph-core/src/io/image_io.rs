use std::path::Path;

use image::{ImageBuffer, ImageFormat, Luma};
use ndarray::Array2;

use crate::error::{HeliographError, Result};

/// Save a u16 image as 16-bit grayscale PNG.
pub fn save_png16(img: &Array2<u16>, path: &Path) -> Result<()> {
    let (h, w) = img.dim();
    let pixels: Vec<u16> = img.iter().copied().collect();

    let buf = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels).ok_or_else(
        || HeliographError::Pipeline("image buffer size does not match dimensions".into()),
    )?;
    buf.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save a u16 image as 16-bit grayscale TIFF.
pub fn save_tiff16(img: &Array2<u16>, path: &Path) -> Result<()> {
    let (h, w) = img.dim();
    let pixels: Vec<u16> = img.iter().copied().collect();

    let buf = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels).ok_or_else(
        || HeliographError::Pipeline("image buffer size does not match dimensions".into()),
    )?;
    buf.save_with_format(path, ImageFormat::Tiff)?;
    Ok(())
}

/// Save, choosing the format from the file extension (PNG by default).
pub fn save_image(img: &Array2<u16>, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("tiff" | "tif") => save_tiff16(img, path),
        _ => save_png16(img, path),
    }
}
