pub mod frames;
pub mod processor;
pub mod writer;

use anyhow::Result;
use opencv::core::Mat;

/// Destination for annotated frames, in order.
pub trait FrameSink {
    fn append(&mut self, frame: &Mat) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}
