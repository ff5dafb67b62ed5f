// Run artifact struct definitions
//
// This module contains the structs persisted in the optional detections
// report written next to the output video.

use crate::pipeline::types::Detection;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Bounding box in frame pixels, top-left corner plus size
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// Detections of a single frame
#[derive(Serialize, Debug, Clone)]
pub struct FrameDetections {
    pub frame: usize,
    pub image: String,
    pub detections: Vec<Detection>,
}

/// Summary of a processed run, written as `--detections` JSON
#[derive(Serialize, Debug, Clone)]
pub struct RunReport {
    pub created_at: DateTime<Utc>,
    pub image_dir: PathBuf,
    pub model: PathBuf,
    pub video: PathBuf,
    pub framerate: u32,
    pub min_conf: f32,
    pub stitching: bool,
    pub frame_count: usize,
    pub elapsed_secs: f64,
    pub frames: Vec<FrameDetections>,
}

impl RunReport {
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write detections to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_report_is_written_as_json() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        let report = RunReport {
            created_at: Utc::now(),
            image_dir: PathBuf::from("frames"),
            model: PathBuf::from("logs/model_files/model.onnx"),
            video: PathBuf::from("video.mp4"),
            framerate: 10,
            min_conf: 0.5,
            stitching: true,
            frame_count: 1,
            elapsed_secs: 0.25,
            frames: vec![FrameDetections {
                frame: 0,
                image: "000000.png".to_string(),
                detections: vec![Detection {
                    bbox: BBox {
                        x: 1.0,
                        y: 2.0,
                        w: 3.0,
                        h: 4.0,
                    },
                    confidence: 0.75,
                }],
            }],
        };

        let path = dir.join("out").join("detections.json");
        report.write(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["frame_count"], 1);
        assert_eq!(value["frames"][0]["image"], "000000.png");
        assert_eq!(value["frames"][0]["detections"][0]["bbox"]["w"], 3.0);
    }
}
