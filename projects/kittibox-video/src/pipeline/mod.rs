// Frame processing pipeline: inference, box stitching and drawing

pub mod detection;
pub mod orchestrator;
pub mod overlay;
pub mod reader;
pub mod rectangles;
pub mod stitching;
pub mod types;
