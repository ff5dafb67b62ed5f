use crate::hypes::Hypes;
use crate::pipeline::reader::spawn_reader;
use crate::pipeline::types::RawFrame;
use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub struct ProcessingStats {
    pub processed_frames: usize,
    pub duration: Duration,
}

impl ProcessingStats {
    pub fn fps(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.processed_frames as f64 / secs
        } else {
            0.0
        }
    }
}

/// A trait for handling decoded frames. This separates the "how to process"
/// from the "how to read and orchestrate" logic.
pub trait FrameProcessor {
    fn process(&mut self, frame: RawFrame) -> Result<()>;
}

/// Blanket implementation so any closure with the right signature
/// automatically implements FrameProcessor.
impl<F> FrameProcessor for F
where
    F: FnMut(RawFrame) -> Result<()>,
{
    fn process(&mut self, frame: RawFrame) -> Result<()> {
        self(frame)
    }
}

fn progress_bar(total: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1.yellow} fps, {eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Feeds every image, decoded and resized to the model input of `hypes` on
/// a reader thread, to `processor` in order.
pub fn process_images<P>(
    images: Vec<PathBuf>,
    hypes: Hypes,
    prefetch: usize,
    mut processor: P,
) -> Result<ProcessingStats>
where
    P: FrameProcessor,
{
    let total = images.len();
    let pb = progress_bar(total)?;
    let start_time = Instant::now();
    let mut processed_frames = 0;

    let (rx, reader) = spawn_reader(images, hypes, prefetch);

    let outcome = (|| -> Result<()> {
        for frame in rx.iter() {
            processor.process(frame?)?;
            processed_frames += 1;
            pb.inc(1);
        }
        Ok(())
    })();

    // Unblocks the reader if we stopped early
    drop(rx);
    reader
        .join()
        .map_err(|_| anyhow!("Frame reader thread panicked"))?;
    outcome?;

    pb.finish_with_message("Done");

    Ok(ProcessingStats {
        processed_frames,
        duration: start_time.elapsed(),
    })
}
