use crate::hypes::Hypes;
use crate::pipeline::types::RawPrediction;
use anyhow::{anyhow, bail, Result};
use ndarray::Array4;
use opencv::core::Mat;
use opencv::prelude::*;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;

pub const BOXES_OUTPUT: &str = "pred_boxes_new";
pub const CONFIDENCES_OUTPUT: &str = "pred_confidences";

/// Anything that maps a model-sized BGR frame to raw grid predictions.
pub trait BoxPredictor {
    fn predict(&mut self, image: &Mat) -> Result<RawPrediction>;
}

/// Runs an exported KittiBox graph through ONNX Runtime.
pub struct KittiBoxDetector {
    session: Session,
    height: usize,
    width: usize,
    boxes_output: String,
    confidences_output: String,
}

impl KittiBoxDetector {
    /// Opens the model. `gpu` selects a CUDA device when the crate is built
    /// with the `cuda` feature.
    pub fn new(model_path: &Path, hypes: &Hypes, gpu: Option<i32>) -> Result<Self> {
        let builder = Session::builder()
            .map_err(|e| anyhow!("Failed to create session builder: {}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Failed to set optimization level: {}", e))?;

        #[cfg(feature = "cuda")]
        let builder = match gpu {
            Some(device_id) => {
                use ort::execution_providers::CUDAExecutionProvider;
                tracing::info!("Using CUDA device {}", device_id);
                builder
                    .with_execution_providers([CUDAExecutionProvider::default()
                        .with_device_id(device_id)
                        .build()])
                    .map_err(|e| anyhow!("Failed to register CUDA provider: {}", e))?
            }
            None => builder,
        };

        #[cfg(not(feature = "cuda"))]
        {
            if let Some(device_id) = gpu {
                tracing::warn!(
                    "GPU {} requested but built without the `cuda` feature, running on CPU",
                    device_id
                );
            }
        }

        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| anyhow!("Failed to load model {}: {}", model_path.display(), e))?;

        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        let (boxes_output, confidences_output) = resolve_output_names(&output_names)?;
        tracing::debug!(
            "Model outputs: boxes={}, confidences={}",
            boxes_output,
            confidences_output
        );

        Ok(Self {
            session,
            height: hypes.image_height as usize,
            width: hypes.image_width as usize,
            boxes_output,
            confidences_output,
        })
    }
}

impl BoxPredictor for KittiBoxDetector {
    fn predict(&mut self, image: &Mat) -> Result<RawPrediction> {
        let input = mat_to_input(image, self.height, self.width)?;
        let tensor =
            Tensor::from_array(input).map_err(|e| anyhow!("Failed to build input: {}", e))?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| anyhow!("Inference failed: {}", e))?;

        let extract = |name: &str| -> Result<Vec<f32>> {
            let value = outputs
                .get(name)
                .ok_or_else(|| anyhow!("Model produced no output named {}", name))?;
            let (_, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| anyhow!("Failed to read {}: {}", name, e))?;
            Ok(data.to_vec())
        };

        Ok(RawPrediction {
            boxes: extract(&self.boxes_output)?,
            confidences: extract(&self.confidences_output)?,
        })
    }
}

/// Picks the box and confidence outputs by name, falling back to the first
/// two outputs in declaration order.
fn resolve_output_names(names: &[String]) -> Result<(String, String)> {
    let has = |n: &str| names.iter().any(|o| o == n);
    if has(BOXES_OUTPUT) && has(CONFIDENCES_OUTPUT) {
        return Ok((BOXES_OUTPUT.to_string(), CONFIDENCES_OUTPUT.to_string()));
    }
    match names {
        [boxes, confidences, ..] => {
            tracing::warn!(
                "Model has no {}/{} outputs, using {} and {}",
                BOXES_OUTPUT,
                CONFIDENCES_OUTPUT,
                boxes,
                confidences
            );
            Ok((boxes.clone(), confidences.clone()))
        }
        _ => bail!(
            "Model must have two outputs (boxes, confidences), found {:?}",
            names
        ),
    }
}

/// Converts a BGR `Mat` of the model size into an NHWC RGB tensor with
/// pixel values in `[0, 255]`.
fn mat_to_input(mat: &Mat, height: usize, width: usize) -> Result<Array4<f32>> {
    let size = mat.size()?;
    if size.height as usize != height || size.width as usize != width {
        bail!(
            "Frame is {}x{}, model expects {}x{}",
            size.width,
            size.height,
            width,
            height
        );
    }

    let mut rgb = Mat::default();
    opencv::imgproc::cvt_color_def(mat, &mut rgb, opencv::imgproc::COLOR_BGR2RGB)?;
    if !rgb.is_continuous() {
        bail!("Mat is not continuous");
    }

    let data: Vec<f32> = rgb.data_bytes()?.iter().map(|&v| v as f32).collect();
    Array4::from_shape_vec((1, height, width, 3), data)
        .map_err(|e| anyhow!("Unexpected frame layout: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn test_output_names_prefer_kittibox_names() {
        let names = vec![
            "pred_logits".to_string(),
            CONFIDENCES_OUTPUT.to_string(),
            BOXES_OUTPUT.to_string(),
        ];
        let (boxes, confs) = resolve_output_names(&names).unwrap();
        assert_eq!(boxes, BOXES_OUTPUT);
        assert_eq!(confs, CONFIDENCES_OUTPUT);
    }

    #[test]
    fn test_output_names_fall_back_to_order() {
        let names = vec!["out0".to_string(), "out1".to_string()];
        let (boxes, confs) = resolve_output_names(&names).unwrap();
        assert_eq!(boxes, "out0");
        assert_eq!(confs, "out1");

        assert!(resolve_output_names(&["only".to_string()]).is_err());
    }

    #[test]
    fn test_mat_to_input_is_rgb() {
        // BGR (10, 20, 30)
        let mat =
            Mat::new_rows_cols_with_default(4, 6, CV_8UC3, Scalar::new(10.0, 20.0, 30.0, 0.0))
                .unwrap();
        let input = mat_to_input(&mat, 4, 6).unwrap();
        assert_eq!(input.shape(), &[1, 4, 6, 3]);
        assert_eq!(input[[0, 0, 0, 0]], 30.0);
        assert_eq!(input[[0, 3, 5, 2]], 10.0);

        assert!(mat_to_input(&mat, 6, 4).is_err());
    }
}
