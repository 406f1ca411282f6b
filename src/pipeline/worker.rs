use anyhow::{anyhow, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use crate::detect::{Classifier, Detection, WeaponLabels};
use crate::frame::Frame;
use crate::pipeline::alert::{AlertStateMachine, AlertTransition, Clock};
use crate::pipeline::history::DetectionHistory;
use crate::pipeline::{FrameResult, PipelineConfig, Shared};

/// Detection history plus alert state. One per pipeline, shared across restarts.
#[derive(Debug)]
pub(crate) struct DetectionTracker {
    history: DetectionHistory,
    alerts: AlertStateMachine,
}

impl DetectionTracker {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            history: DetectionHistory::new(config.history_capacity),
            alerts: AlertStateMachine::new(
                config.detection_threshold,
                config.cooldown,
                config.alert_message.clone(),
            ),
        }
    }

    pub fn record(&mut self, weapon_present: bool, now: SystemTime) -> Option<AlertTransition> {
        self.history.push(weapon_present);
        self.alerts.evaluate(self.history.count_true(), now)
    }

    pub fn alert_active(&self) -> bool {
        self.alerts.is_active()
    }
}

/// Run a classifier on one frame and apply the confidence filter and weapon test.
fn classify(
    classifier: &mut dyn Classifier,
    labels: &WeaponLabels,
    confidence_threshold: f32,
    frame: &Frame,
) -> Result<(bool, Vec<Detection>)> {
    let detections: Vec<Detection> = classifier
        .infer(frame)?
        .into_iter()
        .filter(|d| d.confidence >= confidence_threshold)
        .collect();
    let weapon_detected = labels.any_weapon(&detections);
    Ok((weapon_detected, detections))
}

/// Classify a single frame outside any running pipeline.
///
/// No history or alert state is involved, so `alert_active` is always false.
pub fn evaluate_frame(
    classifier: &mut dyn Classifier,
    labels: &WeaponLabels,
    confidence_threshold: f32,
    frame: Frame,
) -> Result<FrameResult> {
    let (weapon_detected, detections) = classify(classifier, labels, confidence_threshold, &frame)?;
    Ok(FrameResult {
        source_frame: frame,
        weapon_detected,
        detections,
        alert_active: false,
    })
}

/// Single inference worker.
///
/// Records and publishes only while its own `running` flag is set, checked
/// under the tracker lock, so a worker detached by `stop` cannot touch the
/// alert state or the output slots after `stop` returns.
pub(crate) struct Worker {
    pub running: Arc<AtomicBool>,
    pub shared: Arc<Shared>,
    pub classifier: Arc<Mutex<Box<dyn Classifier>>>,
    pub labels: WeaponLabels,
    pub confidence_threshold: f32,
    pub poll_timeout: Duration,
    pub clock: Arc<dyn Clock>,
}

impl Worker {
    /// Drain the queue until told to stop.
    pub fn run(self) {
        log::debug!("inference worker started");
        while self.running.load(Ordering::SeqCst) {
            let Some(frame) = self.shared.queue.pop_timeout(self.poll_timeout) else {
                continue;
            };
            self.process(frame);
        }
        log::debug!("inference worker exiting");
    }

    fn process(&self, frame: Frame) {
        let (weapon_detected, detections) = match self.infer(&frame) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.shared.stats.record_inference_failure();
                log::warn!(
                    "inference failed for frame #{} ({}): {:#}",
                    frame.sequence(),
                    frame.fingerprint(),
                    e
                );
                return;
            }
        };

        let mut tracker = self.shared.tracker();
        if !self.running.load(Ordering::SeqCst) {
            log::debug!(
                "discarding result for frame #{}: worker was stopped",
                frame.sequence()
            );
            return;
        }

        match tracker.record(weapon_detected, self.clock.now()) {
            Some(AlertTransition::Activated(notification)) => {
                self.shared.stats.record_alert();
                log::warn!(
                    "weapon alert raised on frame #{}: {}",
                    frame.sequence(),
                    notification.message
                );
                self.shared.notifications.put(notification);
            }
            Some(AlertTransition::Deactivated) => {
                log::info!("weapon alert cleared on frame #{}", frame.sequence());
            }
            None => {}
        }

        log::debug!(
            "frame #{} processed: weapon={} detections={}",
            frame.sequence(),
            weapon_detected,
            detections.len()
        );
        self.shared.results.put(FrameResult {
            source_frame: frame,
            weapon_detected,
            detections,
            alert_active: tracker.alert_active(),
        });
        self.shared.stats.record_processed();
    }

    /// Panics inside the classifier are treated like any other per-frame failure.
    fn infer(&self, frame: &Frame) -> Result<(bool, Vec<Detection>)> {
        let mut classifier = self
            .classifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            classify(
                &mut **classifier,
                &self.labels,
                self.confidence_threshold,
                frame,
            )
        }));
        match outcome {
            Ok(result) => result,
            Err(_) => Err(anyhow!("classifier '{}' panicked", classifier.name())),
        }
    }
}
