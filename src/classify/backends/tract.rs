#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::classify::backend::Classifier;
use crate::classify::result::{softmax, top1, Prediction, IMAGENET_MEAN, IMAGENET_STD};
use crate::frame::ProcessedFrame;

/// Tract-based ONNX image classifier.
///
/// Expects a model taking `[1, 3, height, width]` f32 input and producing one
/// row of logits. Frames are normalized with the ImageNet mean/std before
/// inference; the output is passed through softmax.
pub struct TractClassifier {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
}

impl TractClassifier {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
        })
    }

    fn build_input(&self, frame: &ProcessedFrame) -> Result<Tensor> {
        if frame.width != self.width || frame.height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            ));
        }
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| {
                (frame.sample(channel, y, x) - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel]
            },
        );
        Ok(input.into_tensor())
    }
}

impl Classifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn classify(&mut self, frame: &ProcessedFrame) -> Result<Prediction> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let logits = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let logits: Vec<f32> = logits.iter().cloned().collect();
        top1(&softmax(&logits)).ok_or_else(|| anyhow!("model produced an empty distribution"))
    }
}
