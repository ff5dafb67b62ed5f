use super::FrameSink;
use crate::video::frames::resize_to;
use anyhow::{anyhow, bail, Context, Result};
use opencv::core::{Mat, Size};
use opencv::prelude::*;
use opencv::videoio::VideoWriter;
use std::fs;
use std::path::{Path, PathBuf};

/// Encodes frames with OpenCV's `VideoWriter`. The stream is opened lazily
/// on the first frame, whose size fixes the size of the video.
pub struct OpencvWriter {
    path: PathBuf,
    fps: f64,
    writer: Option<(VideoWriter, Size)>,
    frames_written: usize,
}

impl OpencvWriter {
    /// Prepares `path` for writing, removing a previous file there.
    pub fn create(path: &Path, fps: u32) -> Result<Self> {
        if fps == 0 {
            bail!("Frame rate must be positive");
        }
        if path.is_file() {
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove existing {}", path.display()))?;
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            fps: fps as f64,
            writer: None,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    fn open(&self, size: Size) -> Result<VideoWriter> {
        let path_str = self
            .path
            .to_str()
            .ok_or_else(|| anyhow!("Non UTF-8 output path: {}", self.path.display()))?;
        let [a, b, c, d] = fourcc_for(&self.path);
        let fourcc = VideoWriter::fourcc(a, b, c, d)?;
        let writer = VideoWriter::new(path_str, fourcc, self.fps, size, true)?;
        if !writer.is_opened()? {
            bail!("Failed to open video writer for {}", self.path.display());
        }
        tracing::debug!(
            "Opened {} ({}x{} @ {} fps)",
            self.path.display(),
            size.width,
            size.height,
            self.fps
        );
        Ok(writer)
    }
}

impl FrameSink for OpencvWriter {
    fn append(&mut self, frame: &Mat) -> Result<()> {
        if self.writer.is_none() {
            let size = frame.size()?;
            self.writer = Some((self.open(size)?, size));
        }

        if let Some((writer, size)) = self.writer.as_mut() {
            if frame.size()? != *size {
                let resized = resize_to(frame, *size)?;
                writer.write(&resized)?;
            } else {
                writer.write(frame)?;
            }
        }

        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some((mut writer, _)) = self.writer.take() {
            writer.release()?;
        }
        Ok(())
    }
}

/// Picks a codec from the file extension.
pub fn fourcc_for(path: &Path) -> [char; 4] {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" | "mov" => ['m', 'p', '4', 'v'],
        "avi" => ['M', 'J', 'P', 'G'],
        _ => ['X', 'V', 'I', 'D'],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn test_fourcc_for_extension() {
        assert_eq!(fourcc_for(Path::new("video.mp4")), ['m', 'p', '4', 'v']);
        assert_eq!(fourcc_for(Path::new("video.AVI")), ['M', 'J', 'P', 'G']);
        assert_eq!(fourcc_for(Path::new("video")), ['X', 'V', 'I', 'D']);
    }

    #[test]
    fn test_create_removes_existing_file() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        let path = dir.join("video.avi");
        fs::write(&path, b"stale").unwrap();
        let _writer = OpencvWriter::create(&path, 10).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_zero_fps_is_rejected() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        assert!(OpencvWriter::create(&dir.join("video.avi"), 0).is_err());
    }

    #[test]
    fn test_writes_frames_of_mixed_size() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        let path = dir.join("video.avi");
        let mut writer = OpencvWriter::create(&path, 10).unwrap();

        let a = Mat::new_rows_cols_with_default(48, 64, CV_8UC3, Scalar::all(0.0)).unwrap();
        let b = Mat::new_rows_cols_with_default(30, 40, CV_8UC3, Scalar::all(255.0)).unwrap();
        writer.append(&a).unwrap();
        writer.append(&b).unwrap();
        writer.finish().unwrap();

        assert_eq!(writer.frames_written(), 2);
        assert!(path.is_file());
    }
}
