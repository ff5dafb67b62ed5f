use crate::hypes::Hypes;
use anyhow::{anyhow, bail, Context, Result};
use opencv::core::{Mat, Size};
use opencv::prelude::*;
use opencv::{imgcodecs, imgproc};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Lists the frames of `image_dir` in file-name order, keeping at most
/// `limit` of them.
pub fn list_images(image_dir: &Path, limit: Option<usize>) -> Result<Vec<PathBuf>> {
    if !image_dir.is_dir() {
        bail!("Image directory not found: {}", image_dir.display());
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(image_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry
            .with_context(|| format!("Failed to list {}", image_dir.display()))?;
        if entry.file_type().is_file() {
            images.push(entry.into_path());
        }
    }

    if let Some(limit) = limit {
        images.truncate(limit);
    }

    Ok(images)
}

/// Decodes one frame as 8-bit BGR.
pub fn read_frame(path: &Path) -> Result<Mat> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow!("Non UTF-8 image path: {}", path.display()))?;
    let mat = imgcodecs::imread(path_str, imgcodecs::IMREAD_COLOR)
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    if mat.empty() {
        bail!("Could not decode image {}", path.display());
    }
    Ok(mat)
}

/// Bicubic resize to an explicit size.
pub fn resize_to(image: &Mat, size: Size) -> Result<Mat> {
    if image.size()? == size {
        return Ok(image.clone());
    }
    let mut out = Mat::default();
    imgproc::resize(image, &mut out, size, 0.0, 0.0, imgproc::INTER_CUBIC)?;
    Ok(out)
}

/// Bicubic resize to the network input size.
pub fn resize_to_model(image: &Mat, hypes: &Hypes) -> Result<Mat> {
    resize_to(
        image,
        Size::new(hypes.image_width as i32, hypes.image_height as i32),
    )
}

/// `(rw, rh)`: how much wider / taller the frame is than the model input.
pub fn scale_factors(original: Size, hypes: &Hypes) -> (f32, f32) {
    (
        original.width as f32 / hypes.image_width as f32,
        original.height as f32 / hypes.image_height as f32,
    )
}
