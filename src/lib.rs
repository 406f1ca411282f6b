//! Weapon Sentinel
//!
//! Streaming detection-and-alert pipeline for camera frames.
//!
//! # Architecture
//!
//! Frames flow through a single pipeline instance owned by the caller:
//!
//! 1. **Admission**: `Pipeline::submit_frame` pushes into a bounded queue that
//!    never blocks producers. A full queue either rejects the frame or evicts
//!    the oldest pending one, depending on `AdmissionPolicy`.
//! 2. **Inference**: one worker thread drains the queue and hands each frame to
//!    the configured `Classifier`. Per-frame failures are logged and skipped.
//! 3. **Aggregation**: each processed frame contributes one "weapon present"
//!    flag to a fixed-size `DetectionHistory` window.
//! 4. **Alerting**: `AlertStateMachine` debounces the window count and gates
//!    activations behind a cooldown. Only the inactive-to-active edge emits a
//!    `Notification`.
//! 5. **Handoff**: the latest `FrameResult` and the pending `Notification` sit
//!    in single-slot channels that callers poll with destructive reads.
//!
//! # Module Structure
//!
//! - `frame`: Frame buffers handed to the pipeline
//! - `detect`: Classifier trait, detections, weapon label matching, backends
//! - `pipeline`: Admission queue, worker, history, alert state machine, slots
//! - `ingest`: Frame sources for the command-line driver
//! - `config`: File and environment configuration

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod pipeline;

pub use detect::{
    BoundingBox, Classifier, ClassifierRegistry, Detection, ScriptedClassifier,
    SimulatedClassifier, WeaponLabels,
};
pub use frame::Frame;
pub use pipeline::{
    evaluate_frame, AdmissionPolicy, AlertState, AlertStateMachine, AlertTransition, Clock,
    DetectionHistory, DetectionReport, FrameResult, IdlePolicy, ManualClock, Notification,
    Pipeline, PipelineConfig, PipelineState, PipelineStats, PipelineStatus, SystemClock,
};
