//! Streaming detection-and-alert pipeline.
//!
//! `Pipeline` is an explicitly owned instance; callers manage its lifecycle
//! (construct, `start`, `stop`, drop). Any number of producers may call
//! `submit_frame` concurrently. Exactly one worker thread drains the
//! admission queue. The detection history and alert state live for the
//! whole pipeline and only the running worker may mutate them.

mod alert;
mod history;
mod queue;
mod report;
mod slot;
mod stats;
mod worker;

pub use alert::{
    AlertState, AlertStateMachine, AlertTransition, Clock, ManualClock, Notification, SystemClock,
};
pub use history::DetectionHistory;
pub use queue::{Admission, AdmissionQueue};
pub use report::{DetectionReport, ReportedDetection};
pub use slot::LatestSlot;
pub use stats::PipelineStats;
pub use worker::evaluate_frame;

use anyhow::{anyhow, bail, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::detect::{Classifier, Detection, WeaponLabels, DEFAULT_WEAPON_LABELS};
use crate::frame::Frame;
use stats::StatsCounters;
use worker::{DetectionTracker, Worker};

pub const DEFAULT_ALERT_MESSAGE: &str = "ALERT: weapon detected by camera!";

const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// What `submit_frame` does when the admission queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdmissionPolicy {
    /// Return `false` immediately and leave the queue unchanged.
    Reject,
    /// Evict the oldest pending frame and enqueue the new one.
    #[default]
    DropOldest,
}

impl FromStr for AdmissionPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().replace('_', "-").as_str() {
            "reject" => Ok(Self::Reject),
            "drop-oldest" => Ok(Self::DropOldest),
            other => Err(anyhow!(
                "unknown admission policy '{}' (expected reject or drop-oldest)",
                other
            )),
        }
    }
}

impl fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => f.write_str("reject"),
            Self::DropOldest => f.write_str("drop-oldest"),
        }
    }
}

/// What `submit_frame` does when the pipeline is not running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdlePolicy {
    /// Return `false` until `start` succeeds.
    #[default]
    Reject,
    /// Try `start` once, then enqueue if it succeeded.
    AutoStart,
}

impl FromStr for IdlePolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().replace('_', "-").as_str() {
            "reject" => Ok(Self::Reject),
            "auto-start" => Ok(Self::AutoStart),
            other => Err(anyhow!(
                "unknown idle policy '{}' (expected reject or auto-start)",
                other
            )),
        }
    }
}

impl fmt::Display for IdlePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => f.write_str("reject"),
            Self::AutoStart => f.write_str("auto-start"),
        }
    }
}

/// Immutable pipeline configuration, validated by `Pipeline::new`.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Detections below this confidence are discarded before weapon matching.
    pub confidence_threshold: f32,
    /// Positive frames in the window needed to activate an alert.
    pub detection_threshold: usize,
    /// Minimum time between two activations.
    pub cooldown: Duration,
    pub history_capacity: usize,
    pub queue_capacity: usize,
    pub admission_policy: AdmissionPolicy,
    pub idle_policy: IdlePolicy,
    pub weapon_labels: Vec<String>,
    pub alert_message: String,
    /// Longest the worker waits for a frame before re-checking its stop flag.
    pub poll_timeout: Duration,
    /// Longest `stop` waits for the worker to exit.
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            detection_threshold: 2,
            cooldown: Duration::from_secs(10),
            history_capacity: 10,
            queue_capacity: 5,
            admission_policy: AdmissionPolicy::DropOldest,
            idle_policy: IdlePolicy::Reject,
            weapon_labels: DEFAULT_WEAPON_LABELS.iter().map(|s| s.to_string()).collect(),
            alert_message: DEFAULT_ALERT_MESSAGE.to_string(),
            poll_timeout: Duration::from_millis(500),
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

impl PipelineConfig {
    /// Check every field and build the label matcher.
    pub fn validate(&self) -> Result<WeaponLabels> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            bail!(
                "confidence_threshold must be within 0..=1 (got {})",
                self.confidence_threshold
            );
        }
        if self.detection_threshold == 0 {
            bail!("detection_threshold must be at least 1");
        }
        if self.history_capacity == 0 {
            bail!("history_capacity must be at least 1");
        }
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be at least 1");
        }
        if self.poll_timeout.is_zero() {
            bail!("poll_timeout must be greater than zero");
        }
        if self.alert_message.trim().is_empty() {
            bail!("alert_message must not be empty");
        }
        if self.detection_threshold > self.history_capacity {
            log::warn!(
                "detection_threshold {} exceeds history_capacity {}; alerts can never fire",
                self.detection_threshold,
                self.history_capacity
            );
        }
        WeaponLabels::new(&self.weapon_labels)
    }
}

// ----------------------------------------------------------------------------
// Results and status
// ----------------------------------------------------------------------------

/// Outcome of one processed frame.
#[derive(Debug)]
pub struct FrameResult {
    pub source_frame: Frame,
    pub weapon_detected: bool,
    pub detections: Vec<Detection>,
    /// Alert state as observed when this frame finished processing.
    pub alert_active: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Never started.
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Running => f.write_str("running"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Health snapshot for status endpoints.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineStatus {
    pub state: PipelineState,
    pub backend: &'static str,
    pub queued_frames: usize,
    pub queue_capacity: usize,
    pub admission_policy: AdmissionPolicy,
    pub stats: PipelineStats,
}

// ----------------------------------------------------------------------------
// Pipeline
// ----------------------------------------------------------------------------

/// State shared between producers, consumers and the worker.
pub(crate) struct Shared {
    pub queue: AdmissionQueue,
    pub results: LatestSlot<FrameResult>,
    pub notifications: LatestSlot<Notification>,
    pub stats: StatsCounters,
    pub running: AtomicBool,
    /// The pipeline's only history and alert state; outlives every worker.
    pub tracker: Mutex<DetectionTracker>,
}

impl Shared {
    pub fn tracker(&self) -> MutexGuard<'_, DetectionTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct WorkerHandle {
    running: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

#[derive(Default)]
struct Control {
    worker: Option<WorkerHandle>,
    /// Set after the first successful warm-up; later starts skip it.
    warmed: bool,
    started_once: bool,
}

pub struct Pipeline {
    config: PipelineConfig,
    labels: WeaponLabels,
    classifier: Arc<Mutex<Box<dyn Classifier>>>,
    backend: &'static str,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
    control: Mutex<Control>,
}

impl Pipeline {
    /// Build a stopped pipeline. Fails fast on invalid configuration.
    pub fn new<C: Classifier + 'static>(config: PipelineConfig, classifier: C) -> Result<Self> {
        Self::with_clock(config, classifier, Arc::new(SystemClock))
    }

    pub fn with_clock<C: Classifier + 'static>(
        config: PipelineConfig,
        classifier: C,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let labels = config.validate()?;
        let backend = classifier.name();
        let classifier: Box<dyn Classifier> = Box::new(classifier);
        let shared = Arc::new(Shared {
            queue: AdmissionQueue::new(config.queue_capacity, config.admission_policy),
            results: LatestSlot::new(),
            notifications: LatestSlot::new(),
            stats: StatsCounters::default(),
            running: AtomicBool::new(false),
            tracker: Mutex::new(DetectionTracker::new(&config)),
        });
        Ok(Self {
            config,
            labels,
            classifier: Arc::new(Mutex::new(classifier)),
            backend,
            clock,
            shared,
            control: Mutex::new(Control::default()),
        })
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Warm up the classifier and spawn the inference worker.
    ///
    /// Returns false when the classifier is unavailable; the pipeline then
    /// stays stopped. Starting a running pipeline is a no-op returning true.
    /// History and alert state carry over from any previous run.
    pub fn start(&self) -> bool {
        let mut control = self.control();
        if control.worker.is_some() {
            return true;
        }
        if !control.warmed {
            if !self.warm_up_classifier() {
                return false;
            }
            control.warmed = true;
        }

        let running = Arc::new(AtomicBool::new(true));
        let worker = Worker {
            running: running.clone(),
            shared: self.shared.clone(),
            classifier: self.classifier.clone(),
            labels: self.labels.clone(),
            confidence_threshold: self.config.confidence_threshold,
            poll_timeout: self.config.poll_timeout,
            clock: self.clock.clone(),
        };

        // Frames that slipped in while stopped are stale.
        let stale = self.shared.queue.clear();
        if stale > 0 {
            log::debug!("discarded {} frames queued while stopped", stale);
        }
        self.shared.queue.resume();
        let spawned = std::thread::Builder::new()
            .name("sentinel-inference".to_string())
            .spawn(move || worker.run());
        match spawned {
            Ok(join) => {
                control.worker = Some(WorkerHandle { running, join });
                control.started_once = true;
                self.shared.running.store(true, Ordering::SeqCst);
                log::info!(
                    "pipeline started (backend={}, queue={} {}, window={}, threshold={}, cooldown={:?})",
                    self.backend,
                    self.config.queue_capacity,
                    self.config.admission_policy,
                    self.config.history_capacity,
                    self.config.detection_threshold,
                    self.config.cooldown
                );
                true
            }
            Err(e) => {
                log::error!("failed to spawn inference worker: {}", e);
                false
            }
        }
    }

    /// Take the classifier lock without waiting past the shutdown timeout.
    fn warm_up_classifier(&self) -> bool {
        let deadline = Instant::now() + self.config.shutdown_timeout;
        let mut classifier = loop {
            match self.classifier.try_lock() {
                Ok(guard) => break guard,
                Err(TryLockError::Poisoned(e)) => break e.into_inner(),
                Err(TryLockError::WouldBlock) if Instant::now() < deadline => {
                    std::thread::sleep(SHUTDOWN_POLL);
                }
                Err(TryLockError::WouldBlock) => {
                    log::warn!(
                        "cannot start pipeline: classifier '{}' is still busy",
                        self.backend
                    );
                    return false;
                }
            }
        };
        match classifier.warm_up() {
            Ok(()) => true,
            Err(e) => {
                log::error!(
                    "cannot start pipeline: classifier '{}' unavailable: {:#}",
                    self.backend,
                    e
                );
                false
            }
        }
    }

    /// Signal the worker to exit and wait up to the shutdown timeout.
    ///
    /// Pending frames are discarded. A worker that overruns the timeout is
    /// detached with a warning; it can no longer record or publish, and the
    /// next `start` spawns a fresh one.
    pub fn stop(&self) {
        let (handle, discarded) = {
            let mut control = self.control();
            let Some(handle) = control.worker.take() else {
                return;
            };
            self.shared.running.store(false, Ordering::SeqCst);
            handle.running.store(false, Ordering::SeqCst);
            self.shared.queue.interrupt();
            (handle, self.shared.queue.clear())
        };
        // Waits out any publish already in progress; later ones see the flag.
        drop(self.shared.tracker());

        let deadline = Instant::now() + self.config.shutdown_timeout;
        while !handle.join.is_finished() && Instant::now() < deadline {
            std::thread::sleep(SHUTDOWN_POLL);
        }

        if handle.join.is_finished() {
            if handle.join.join().is_err() {
                log::error!("inference worker panicked");
            }
        } else {
            log::warn!(
                "inference worker did not exit within {:?}; detaching it",
                self.config.shutdown_timeout
            );
        }
        log::info!("pipeline stopped ({} pending frames discarded)", discarded);
    }

    /// Offer a frame for inference. Never blocks on backpressure.
    pub fn submit_frame(&self, frame: Frame) -> bool {
        self.shared.stats.record_submitted();

        if !self.is_running() {
            let started = match self.config.idle_policy {
                IdlePolicy::Reject => false,
                IdlePolicy::AutoStart => self.start(),
            };
            if !started {
                self.shared.stats.record_rejected();
                log::debug!("frame rejected: pipeline not running");
                return false;
            }
        }

        match self.shared.queue.push(frame, self.clock.now()) {
            Admission::Queued => {
                self.shared.stats.record_accepted();
                true
            }
            Admission::QueuedEvicting(evicted) => {
                self.shared.stats.record_accepted();
                self.shared.stats.record_dropped();
                log::debug!("queue full: dropped pending frame #{}", evicted.sequence());
                true
            }
            Admission::Rejected(_) => {
                self.shared.stats.record_rejected();
                log::debug!("queue full: frame rejected");
                false
            }
        }
    }

    /// Take the latest frame result, if one arrived since the last call.
    pub fn poll_result(&self) -> Option<FrameResult> {
        self.shared.results.take()
    }

    /// Take the pending notification, if any.
    pub fn poll_notification(&self) -> Option<Notification> {
        self.shared.notifications.take()
    }

    /// Alias of `poll_result`.
    pub fn get_latest_result(&self) -> Option<FrameResult> {
        self.poll_result()
    }

    /// Alias of `poll_notification`.
    pub fn get_notification(&self) -> Option<Notification> {
        self.poll_notification()
    }

    /// Poll both channels and shape them into a response body.
    pub fn poll_report(&self) -> DetectionReport {
        let result = self.poll_result();
        let notification = self.poll_notification();
        DetectionReport::new(result.as_ref(), notification.as_ref())
    }

    pub fn queued_frames(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.stats.snapshot()
    }

    pub fn status(&self) -> PipelineStatus {
        let state = if self.is_running() {
            PipelineState::Running
        } else if self.control().started_once {
            PipelineState::Stopped
        } else {
            PipelineState::Idle
        };
        PipelineStatus {
            state,
            backend: self.backend,
            queued_frames: self.shared.queue.len(),
            queue_capacity: self.shared.queue.capacity(),
            admission_policy: self.shared.queue.policy(),
            stats: self.stats(),
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ScriptedClassifier;

    #[test]
    fn default_config_is_valid() {
        let labels = PipelineConfig::default().validate().unwrap();
        assert!(labels.is_weapon("firearms"));
    }

    #[test]
    fn invalid_config_fails_construction() {
        let cases = [
            PipelineConfig {
                detection_threshold: 0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                history_capacity: 0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                queue_capacity: 0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                confidence_threshold: 1.5,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                confidence_threshold: f32::NAN,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                weapon_labels: Vec::new(),
                ..PipelineConfig::default()
            },
            PipelineConfig {
                poll_timeout: Duration::ZERO,
                ..PipelineConfig::default()
            },
        ];
        for config in cases {
            assert!(
                Pipeline::new(config.clone(), ScriptedClassifier::new()).is_err(),
                "accepted {:?}",
                config
            );
        }
    }

    #[test]
    fn threshold_above_window_is_allowed() {
        let config = PipelineConfig {
            detection_threshold: 20,
            history_capacity: 10,
            ..PipelineConfig::default()
        };
        assert!(Pipeline::new(config, ScriptedClassifier::new()).is_ok());
    }

    #[test]
    fn policies_parse_from_strings() {
        assert_eq!(
            "drop_oldest".parse::<AdmissionPolicy>().unwrap(),
            AdmissionPolicy::DropOldest
        );
        assert_eq!(
            "Reject".parse::<AdmissionPolicy>().unwrap(),
            AdmissionPolicy::Reject
        );
        assert_eq!(
            "auto-start".parse::<IdlePolicy>().unwrap(),
            IdlePolicy::AutoStart
        );
        assert!("block".parse::<AdmissionPolicy>().is_err());
        assert!("maybe".parse::<IdlePolicy>().is_err());
        assert_eq!(AdmissionPolicy::DropOldest.to_string(), "drop-oldest");
    }

    #[test]
    fn start_discards_frames_left_from_a_previous_run() {
        let classifier = ScriptedClassifier::new();
        let script = classifier.handle();
        let pipeline = Pipeline::new(PipelineConfig::default(), classifier).unwrap();
        pipeline
            .shared
            .queue
            .push(Frame::new(vec![0; 3], 1, 1), std::time::SystemTime::now());
        assert_eq!(pipeline.queued_frames(), 1);

        assert!(pipeline.start());
        assert_eq!(pipeline.queued_frames(), 0);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(script.calls(), 0);
        pipeline.stop();
    }

    #[test]
    fn warm_up_runs_once_across_restarts() {
        let classifier = ScriptedClassifier::new();
        let script = classifier.handle();
        let pipeline = Pipeline::new(PipelineConfig::default(), classifier).unwrap();
        assert!(pipeline.start());
        pipeline.stop();

        script.fail_warm_up("would fail if called again");
        assert!(pipeline.start());
        assert!(pipeline.is_running());
    }

    #[test]
    fn new_pipeline_is_idle() {
        let pipeline = Pipeline::new(PipelineConfig::default(), ScriptedClassifier::new()).unwrap();
        let status = pipeline.status();
        assert_eq!(status.state, PipelineState::Idle);
        assert_eq!(status.backend, "scripted");
        assert_eq!(status.queue_capacity, 5);
        assert!(pipeline.poll_result().is_none());
        assert!(pipeline.poll_notification().is_none());
    }
}
