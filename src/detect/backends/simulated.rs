use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detect::backend::Classifier;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

const SIMULATED_WEAPON_LABEL: &str = "pistol";
const SIMULATED_BYSTANDER_LABEL: &str = "person";

/// Randomized backend for running the pipeline without a model.
///
/// Every frame yields a person detection; with probability `weapon_rate` it
/// also yields a pistol held somewhere inside the frame. Seeded, so runs are
/// reproducible.
pub struct SimulatedClassifier {
    rng: StdRng,
    weapon_rate: f64,
}

impl SimulatedClassifier {
    pub fn new(weapon_rate: f64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            weapon_rate: weapon_rate.clamp(0.0, 1.0),
        }
    }

    fn random_box(&mut self, width: f32, height: f32) -> BoundingBox {
        let w = width * self.rng.gen_range(0.05..0.3);
        let h = height * self.rng.gen_range(0.05..0.3);
        let x1 = self.rng.gen_range(0.0..(width - w).max(1.0));
        let y1 = self.rng.gen_range(0.0..(height - h).max(1.0));
        BoundingBox::new(x1, y1, x1 + w, y1 + h)
    }
}

impl Classifier for SimulatedClassifier {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if frame.width == 0 || frame.height == 0 {
            return Err(anyhow!(
                "frame has empty dimensions {}x{}",
                frame.width,
                frame.height
            ));
        }
        let (width, height) = (frame.width as f32, frame.height as f32);

        let mut detections = vec![Detection::new(
            SIMULATED_BYSTANDER_LABEL,
            self.rng.gen_range(0.6..0.99),
            self.random_box(width, height),
        )];
        if self.rng.gen_bool(self.weapon_rate) {
            detections.push(Detection::new(
                SIMULATED_WEAPON_LABEL,
                self.rng.gen_range(0.3..0.95),
                self.random_box(width, height),
            ));
        }
        Ok(detections)
    }
}
