// Reader worker: decodes frames ahead of inference and sends them through a channel

use crate::hypes::Hypes;
use crate::pipeline::types::RawFrame;
use crate::video::frames::{read_frame, resize_to_model};
use anyhow::{Context, Result};
use crossbeam::channel::{self, Receiver, Sender};
use opencv::prelude::*;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

/// Reads `images` in order, resizes each to the model input and sends it on.
/// A decode error is forwarded and ends the worker.
pub fn read_worker(images: Vec<PathBuf>, hypes: Hypes, tx: Sender<Result<RawFrame>>) {
    for (id, path) in images.into_iter().enumerate() {
        let frame = load(id, path, &hypes);
        let failed = frame.is_err();
        if tx.send(frame).is_err() || failed {
            // Receiver closed, or nothing sensible to read after an error
            break;
        }
    }
}

fn load(id: usize, path: PathBuf, hypes: &Hypes) -> Result<RawFrame> {
    let mat = read_frame(&path)?;
    let original_size = mat.size()?;
    let resized = resize_to_model(&mat, hypes)
        .with_context(|| format!("Failed to resize {}", path.display()))?;
    Ok(RawFrame {
        id,
        path,
        original_size,
        resized,
    })
}

/// Starts the reader on its own thread with a queue of `prefetch` frames.
pub fn spawn_reader(
    images: Vec<PathBuf>,
    hypes: Hypes,
    prefetch: usize,
) -> (Receiver<Result<RawFrame>>, JoinHandle<()>) {
    let (tx, rx) = channel::bounded(prefetch.max(1));
    let handle = thread::spawn(move || read_worker(images, hypes, tx));
    (rx, handle)
}
