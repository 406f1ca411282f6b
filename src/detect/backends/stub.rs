use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::detect::backend::Classifier;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Scripted backend for tests and dry runs.
///
/// Each `infer` call consumes the next scripted step. An exhausted script
/// yields no detections. The script stays reachable through a `ScriptHandle`
/// after the classifier has been moved into a pipeline.
pub struct ScriptedClassifier {
    script: Arc<Mutex<Script>>,
}

#[derive(Default)]
struct Script {
    steps: VecDeque<Step>,
    warm_up_error: Option<String>,
    delay: Option<Duration>,
    calls: u64,
}

enum Step {
    Detections(Vec<Detection>),
    Failure(String),
}

/// Shared control over a `ScriptedClassifier`.
#[derive(Clone)]
pub struct ScriptHandle {
    script: Arc<Mutex<Script>>,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    pub fn handle(&self) -> ScriptHandle {
        ScriptHandle {
            script: self.script.clone(),
        }
    }
}

impl Default for ScriptedClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptHandle {
    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_detections(&self, detections: Vec<Detection>) {
        self.lock().steps.push_back(Step::Detections(detections));
    }

    /// Queue one frame containing a pistol.
    pub fn push_weapon(&self) {
        self.push_detections(vec![Detection::new(
            "pistol",
            0.91,
            BoundingBox::new(10.0, 10.0, 60.0, 40.0),
        )]);
    }

    /// Queue one frame containing only a person.
    pub fn push_clear(&self) {
        self.push_detections(vec![Detection::new(
            "person",
            0.88,
            BoundingBox::new(0.0, 0.0, 100.0, 200.0),
        )]);
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.lock().steps.push_back(Step::Failure(message.into()));
    }

    pub fn fail_warm_up(&self, message: impl Into<String>) {
        self.lock().warm_up_error = Some(message.into());
    }

    pub fn clear_warm_up_failure(&self) {
        self.lock().warm_up_error = None;
    }

    /// Sleep this long inside every `infer` call.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = Some(delay);
    }

    /// Number of `infer` calls so far.
    pub fn calls(&self) -> u64 {
        self.lock().calls
    }

    pub fn pending_steps(&self) -> usize {
        self.lock().steps.len()
    }
}

impl Classifier for ScriptedClassifier {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn warm_up(&mut self) -> Result<()> {
        let script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        match &script.warm_up_error {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(()),
        }
    }

    fn infer(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        let (step, delay) = {
            let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
            script.calls += 1;
            (script.steps.pop_front(), script.delay)
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        match step {
            Some(Step::Detections(detections)) => Ok(detections),
            Some(Step::Failure(message)) => Err(anyhow!("{}", message)),
            None => Ok(Vec::new()),
        }
    }
}
