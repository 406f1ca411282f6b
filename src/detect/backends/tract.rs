#![cfg(feature = "backend-tract")]

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::Classifier;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

type OnnxPlan = TypedRunnableModel<TypedModel>;

const DEFAULT_NMS_IOU: f32 = 0.45;

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// Expects a single output shaped `[1, 4 + classes, anchors]` with boxes in
/// center/size layout, in input pixel units. The model is loaded lazily by
/// `warm_up`, so a missing file surfaces as "capability unavailable" at start.
pub struct TractClassifier {
    model_path: PathBuf,
    model: Option<OnnxPlan>,
    class_names: Vec<String>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
    nms_iou: f32,
}

impl TractClassifier {
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        class_names: Vec<String>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            model: None,
            class_names,
            width,
            height,
            confidence_threshold: 0.25,
            nms_iou: DEFAULT_NMS_IOU,
        }
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn load(&self) -> Result<OnnxPlan> {
        let model_path = &self.model_path;
        tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, self.height as usize, self.width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        if frame.width != self.width || frame.height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            ));
        }

        let expected_len = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;

        let pixels = frame.pixels();
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let width = self.width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let classes = shape[1] - 4;
        let anchors = shape[2];

        let mut candidates = Vec::new();
        for i in 0..anchors {
            let mut best_class = 0;
            let mut best_score = f32::NEG_INFINITY;
            for c in 0..classes {
                let score = view[[0, 4 + c, i]];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }
            if !best_score.is_finite() || best_score < self.confidence_threshold {
                continue;
            }
            let bbox = BoundingBox::from_center(
                view[[0, 0, i]],
                view[[0, 1, i]],
                view[[0, 2, i]],
                view[[0, 3, i]],
            );
            candidates.push((best_class, best_score, bbox));
        }

        Ok(self.suppress(candidates))
    }

    /// Per-class non-maximum suppression.
    fn suppress(&self, mut candidates: Vec<(usize, f32, BoundingBox)>) -> Vec<Detection> {
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        let mut kept: Vec<(usize, f32, BoundingBox)> = Vec::new();
        for candidate in candidates {
            let overlaps = kept
                .iter()
                .any(|k| k.0 == candidate.0 && k.2.iou(&candidate.2) > self.nms_iou);
            if !overlaps {
                kept.push(candidate);
            }
        }
        kept.into_iter()
            .map(|(class, score, bbox)| {
                let label = self
                    .class_names
                    .get(class)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{}", class));
                Detection::new(label, score, bbox)
            })
            .collect()
    }
}

impl Classifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn warm_up(&mut self) -> Result<()> {
        if self.model.is_none() {
            self.model = Some(self.load()?);
            log::info!("tract model loaded from {}", self.model_path.display());
        }
        Ok(())
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("tract model not loaded"))?;
        let outputs = model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs)
    }
}
