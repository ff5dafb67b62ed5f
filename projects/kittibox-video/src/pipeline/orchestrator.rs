// Pipeline orchestrator: runs the whole frames-to-video lifecycle
//
// Loads the model from the log directory, then streams every frame through
// inference, box stitching and drawing into the video writer.

use crate::cli::Args;
use crate::hypes::{load_hypes, Hypes, ModelFiles};
use crate::pipeline::detection::{BoxPredictor, KittiBoxDetector};
use crate::pipeline::overlay::draw_rects;
use crate::pipeline::rectangles::{add_rectangles, RectangleOptions};
use crate::pipeline::types::{AnnotatedFrame, Detection, RawFrame};
use crate::run_artifacts::{FrameDetections, RunReport};
use crate::video::frames::{list_images, resize_to, scale_factors};
use crate::video::processor::{process_images, ProcessingStats};
use crate::video::writer::OpencvWriter;
use crate::video::FrameSink;
use anyhow::{anyhow, Result};
use std::path::PathBuf;

/// Setup failures the tool reports with a plain message and exit status 1
#[derive(Debug)]
pub enum SetupError {
    /// The log directory lacks hypes or model files
    ModelFiles(anyhow::Error),
    NoImages,
}

impl std::fmt::Display for SetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetupError::ModelFiles(e) => write!(f, "Could not load the model files: {}", e),
            SetupError::NoImages => write!(f, "No image found in given image_dir."),
        }
    }
}

impl std::error::Error for SetupError {}

/// Turns one model-sized frame into an annotated frame of the original size.
pub struct Annotator<P> {
    hypes: Hypes,
    predictor: P,
    opts: RectangleOptions,
}

impl<P: BoxPredictor> Annotator<P> {
    pub fn new(hypes: Hypes, predictor: P, opts: RectangleOptions) -> Self {
        Self {
            hypes,
            predictor,
            opts,
        }
    }

    pub fn annotate(&mut self, frame: RawFrame) -> Result<AnnotatedFrame> {
        let prediction = self.predictor.predict(&frame.resized)?;
        let rects = add_rectangles(&self.hypes, &prediction, &self.opts)?;

        let mut image = frame.resized;
        draw_rects(&mut image, &rects)?;
        let image = resize_to(&image, frame.original_size)?;

        let (rw, rh) = scale_factors(frame.original_size, &self.hypes);
        let detections = rects
            .accepted
            .iter()
            .map(|r| Detection::from_rect(r, rw, rh))
            .collect();

        Ok(AnnotatedFrame {
            id: frame.id,
            image,
            detections,
        })
    }
}

/// Annotates every image into `sink`, returning run statistics and the
/// detections of each frame.
pub fn annotate_images<P, S>(
    images: Vec<PathBuf>,
    annotator: &mut Annotator<P>,
    sink: &mut S,
    prefetch: usize,
) -> Result<(ProcessingStats, Vec<FrameDetections>)>
where
    P: BoxPredictor,
    S: FrameSink,
{
    let mut frames = Vec::with_capacity(images.len());
    let hypes = annotator.hypes.clone();

    let stats = process_images(images, hypes, prefetch, |frame: RawFrame| {
        let image_name = frame
            .path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let annotated = annotator.annotate(frame)?;
        sink.append(&annotated.image)?;
        tracing::debug!(
            "Frame {} ({}): {} detections",
            annotated.id,
            image_name,
            annotated.detections.len()
        );
        frames.push(FrameDetections {
            frame: annotated.id,
            image: image_name,
            detections: annotated.detections,
        });
        Ok(())
    })?;

    sink.finish()?;
    Ok((stats, frames))
}

fn parse_gpu(gpus: Option<&str>) -> Result<Option<i32>> {
    match gpus.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        // "0,1" selects the first listed device
        Some(list) => {
            let first = list.split(',').next().unwrap_or(list).trim();
            first
                .parse::<i32>()
                .map(Some)
                .map_err(|_| anyhow!("Invalid GPU id: {}", list))
        }
    }
}

/// Runs the tool end to end.
pub fn run(args: &Args) -> Result<ProcessingStats> {
    let images = list_images(&args.image_dir, args.frame_limit())?;
    if images.is_empty() {
        return Err(SetupError::NoImages.into());
    }

    let files =
        ModelFiles::locate(&args.logdir, &args.model).map_err(SetupError::ModelFiles)?;

    tracing::debug!(
        "Using hypes {} and model {}",
        files.hypes.display(),
        files.model.display()
    );
    let hypes = load_hypes(&files.hypes)?;
    tracing::info!("Hypes loaded successfully.");

    let gpu = parse_gpu(args.gpus.as_deref())?;
    let detector = KittiBoxDetector::new(&files.model, &hypes, gpu)?;
    tracing::info!("Weights loaded successfully.");

    let opts = RectangleOptions {
        use_stitching: !args.no_stitching,
        show_removed: args.show_removed,
        ..RectangleOptions::from_hypes(&hypes, args.min_conf)
    };
    let mut annotator = Annotator::new(hypes, detector, opts);
    let mut writer = OpencvWriter::create(&args.save, args.framerate)?;

    tracing::info!("Making video");
    let (stats, frames) = annotate_images(images, &mut annotator, &mut writer, args.prefetch)?;

    tracing::debug!("{} frames encoded", writer.frames_written());
    tracing::info!("Video saved as {}", args.save.display());
    tracing::info!("Number of images: {}", stats.processed_frames);
    tracing::info!("Time takes: {:.2} s", stats.duration.as_secs_f64());
    tracing::info!("Frequency: {:.2} fps", stats.fps());

    if let Some(path) = &args.detections {
        let report = RunReport {
            created_at: chrono::Utc::now(),
            image_dir: args.image_dir.clone(),
            model: files.model.clone(),
            video: args.save.clone(),
            framerate: args.framerate,
            min_conf: opts.min_conf,
            stitching: opts.use_stitching,
            frame_count: stats.processed_frames,
            elapsed_secs: stats.duration.as_secs_f64(),
            frames,
        };
        report.write(path)?;
        tracing::info!("Detections saved as {}", path.display());
    }

    Ok(stats)
}
