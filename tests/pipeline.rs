use std::sync::Arc;
use std::time::{Duration, Instant};

use weapon_sentinel::detect::ScriptHandle;
use weapon_sentinel::{
    AdmissionPolicy, Frame, FrameResult, IdlePolicy, ManualClock, Pipeline, PipelineConfig,
    PipelineState, ScriptedClassifier,
};

const WAIT: Duration = Duration::from_secs(5);

fn frame() -> Frame {
    Frame::new(vec![7; 4 * 4 * 3], 4, 4)
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        poll_timeout: Duration::from_millis(20),
        shutdown_timeout: Duration::from_secs(2),
        ..PipelineConfig::default()
    }
}

fn wait_for_result(pipeline: &Pipeline) -> FrameResult {
    let deadline = Instant::now() + WAIT;
    loop {
        if let Some(result) = pipeline.poll_result() {
            return result;
        }
        assert!(Instant::now() < deadline, "timed out waiting for a result");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn scripted_pipeline(config: PipelineConfig) -> (Pipeline, ManualClock, ScriptHandle) {
    let classifier = ScriptedClassifier::new();
    let script = classifier.handle();
    let clock = ManualClock::at_secs(1_000);
    let pipeline = Pipeline::with_clock(config, classifier, Arc::new(clock.clone()))
        .expect("valid config");
    (pipeline, clock, script)
}

#[test]
fn consecutive_weapon_frames_raise_one_notification() {
    let (pipeline, _clock, script) = scripted_pipeline(fast_config());
    for _ in 0..3 {
        script.push_weapon();
    }
    assert!(pipeline.start());

    assert!(pipeline.submit_frame(frame()));
    let first = wait_for_result(&pipeline);
    assert!(first.weapon_detected);
    assert!(!first.alert_active);
    assert!(pipeline.poll_notification().is_none());

    assert!(pipeline.submit_frame(frame()));
    let second = wait_for_result(&pipeline);
    assert!(second.alert_active);
    let notification = pipeline.poll_notification().expect("alert notification");
    assert_eq!(notification.message, "ALERT: weapon detected by camera!");

    assert!(pipeline.submit_frame(frame()));
    let third = wait_for_result(&pipeline);
    assert!(third.alert_active);
    assert!(pipeline.poll_notification().is_none());

    let stats = pipeline.stats();
    assert_eq!(stats.alerts_raised, 1);
    assert_eq!(stats.frames_processed, 3);
    pipeline.stop();
}

#[test]
fn cleared_window_deactivates_and_cooldown_blocks_reactivation() {
    let config = PipelineConfig {
        detection_threshold: 1,
        history_capacity: 2,
        cooldown: Duration::from_secs(10),
        ..fast_config()
    };
    let (pipeline, clock, script) = scripted_pipeline(config);
    assert!(pipeline.start());

    script.push_weapon();
    pipeline.submit_frame(frame());
    assert!(wait_for_result(&pipeline).alert_active);
    assert!(pipeline.poll_notification().is_some());

    script.push_clear();
    pipeline.submit_frame(frame());
    assert!(wait_for_result(&pipeline).alert_active);

    script.push_clear();
    pipeline.submit_frame(frame());
    assert!(!wait_for_result(&pipeline).alert_active);

    clock.advance(Duration::from_secs(5));
    script.push_weapon();
    pipeline.submit_frame(frame());
    let within_cooldown = wait_for_result(&pipeline);
    assert!(within_cooldown.weapon_detected);
    assert!(!within_cooldown.alert_active);
    assert!(pipeline.poll_notification().is_none());

    clock.advance(Duration::from_secs(6));
    script.push_weapon();
    pipeline.submit_frame(frame());
    assert!(wait_for_result(&pipeline).alert_active);
    assert!(pipeline.poll_notification().is_some());
    assert_eq!(pipeline.stats().alerts_raised, 2);
}

#[test]
fn inference_failure_does_not_stop_the_worker() {
    let (pipeline, _clock, script) = scripted_pipeline(fast_config());
    script.push_failure("decoder hiccup");
    script.push_weapon();
    assert!(pipeline.start());

    assert!(pipeline.submit_frame(frame()));
    assert!(pipeline.submit_frame(frame()));

    let result = wait_for_result(&pipeline);
    assert!(result.weapon_detected);
    assert_eq!(result.source_frame.sequence(), 2);

    let stats = pipeline.stats();
    assert_eq!(stats.inference_failures, 1);
    assert_eq!(stats.frames_processed, 1);
    assert!(pipeline.is_running());
}

#[test]
fn latest_result_is_read_once() {
    let (pipeline, _clock, script) = scripted_pipeline(fast_config());
    script.push_clear();
    assert!(pipeline.start());
    pipeline.submit_frame(frame());

    let result = wait_for_result(&pipeline);
    assert!(!result.weapon_detected);
    assert_eq!(result.detections[0].label, "person");
    assert!(pipeline.get_latest_result().is_none());
    assert!(pipeline.get_notification().is_none());
}

#[test]
fn poll_report_merges_result_and_notification() {
    let config = PipelineConfig {
        detection_threshold: 1,
        ..fast_config()
    };
    let (pipeline, _clock, script) = scripted_pipeline(config);
    script.push_weapon();
    assert!(pipeline.start());
    pipeline.submit_frame(frame());
    wait_until("notification", || pipeline.stats().alerts_raised == 1);
    wait_until("processed frame", || pipeline.stats().frames_processed == 1);

    let report = pipeline.poll_report();
    assert!(report.weapons_detected);
    assert!(report.alert_triggered);
    assert!(report.notification);
    assert_eq!(report.detections[0].class, "pistol");

    let empty = pipeline.poll_report();
    assert!(!empty.is_noteworthy());
}

#[test]
fn submissions_are_rejected_until_started() {
    let (pipeline, _clock, _script) = scripted_pipeline(fast_config());
    assert_eq!(pipeline.status().state, PipelineState::Idle);
    assert!(!pipeline.submit_frame(frame()));
    assert_eq!(pipeline.stats().frames_rejected, 1);
    assert_eq!(pipeline.queued_frames(), 0);
}

#[test]
fn auto_start_policy_starts_on_first_submission() {
    let config = PipelineConfig {
        idle_policy: IdlePolicy::AutoStart,
        ..fast_config()
    };
    let (pipeline, _clock, script) = scripted_pipeline(config);
    script.push_weapon();

    assert!(pipeline.submit_frame(frame()));
    assert!(pipeline.is_running());
    assert!(wait_for_result(&pipeline).weapon_detected);
}

#[test]
fn failed_warm_up_keeps_pipeline_stopped() {
    let config = PipelineConfig {
        idle_policy: IdlePolicy::AutoStart,
        ..fast_config()
    };
    let (pipeline, _clock, script) = scripted_pipeline(config);
    script.fail_warm_up("model file missing");

    assert!(!pipeline.start());
    assert!(!pipeline.is_running());
    assert!(!pipeline.submit_frame(frame()));
    assert_eq!(pipeline.status().state, PipelineState::Idle);

    script.clear_warm_up_failure();
    assert!(pipeline.submit_frame(frame()));
    assert!(pipeline.is_running());
}

#[test]
fn pipeline_restarts_with_its_alert_state() {
    let config = PipelineConfig {
        detection_threshold: 1,
        ..fast_config()
    };
    let (pipeline, _clock, script) = scripted_pipeline(config);
    script.push_weapon();
    script.push_weapon();
    assert!(pipeline.start());
    assert!(pipeline.start());

    pipeline.submit_frame(frame());
    assert!(wait_for_result(&pipeline).alert_active);
    assert!(pipeline.poll_notification().is_some());

    pipeline.stop();
    assert!(!pipeline.is_running());
    assert_eq!(pipeline.status().state, PipelineState::Stopped);
    assert!(!pipeline.submit_frame(frame()));

    assert!(pipeline.start());
    pipeline.submit_frame(frame());
    let result = wait_for_result(&pipeline);
    assert!(result.alert_active);
    assert!(pipeline.poll_notification().is_none());
    assert_eq!(pipeline.status().state, PipelineState::Running);
}

#[test]
fn full_queue_rejects_under_reject_policy() {
    let config = PipelineConfig {
        queue_capacity: 1,
        admission_policy: AdmissionPolicy::Reject,
        ..fast_config()
    };
    let (pipeline, _clock, script) = scripted_pipeline(config);
    script.set_delay(Duration::from_millis(300));
    assert!(pipeline.start());

    assert!(pipeline.submit_frame(frame()));
    wait_until("worker to take the first frame", || script.calls() == 1);
    assert!(pipeline.submit_frame(frame()));
    assert!(!pipeline.submit_frame(frame()));

    let stats = pipeline.stats();
    assert_eq!(stats.frames_submitted, 3);
    assert_eq!(stats.frames_accepted, 2);
    assert_eq!(stats.frames_rejected, 1);
}

#[test]
fn full_queue_evicts_oldest_under_drop_oldest_policy() {
    let config = PipelineConfig {
        queue_capacity: 1,
        admission_policy: AdmissionPolicy::DropOldest,
        ..fast_config()
    };
    let (pipeline, _clock, script) = scripted_pipeline(config);
    script.set_delay(Duration::from_millis(200));
    assert!(pipeline.start());

    assert!(pipeline.submit_frame(frame()));
    wait_until("worker to take the first frame", || script.calls() == 1);
    assert!(pipeline.submit_frame(frame()));
    assert!(pipeline.submit_frame(frame()));
    assert_eq!(pipeline.queued_frames(), 1);
    assert_eq!(pipeline.stats().frames_dropped, 1);

    wait_until("both surviving frames", || pipeline.stats().frames_processed == 2);
    let result = wait_for_result(&pipeline);
    assert_eq!(result.source_frame.sequence(), 3);
}

#[test]
fn stop_gives_up_on_a_stuck_worker() {
    let config = PipelineConfig {
        shutdown_timeout: Duration::from_millis(50),
        ..fast_config()
    };
    let (pipeline, _clock, script) = scripted_pipeline(config);
    script.set_delay(Duration::from_millis(1_500));
    assert!(pipeline.start());
    pipeline.submit_frame(frame());
    wait_until("worker to start inference", || script.calls() == 1);

    let started = Instant::now();
    pipeline.stop();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!pipeline.is_running());
    assert_eq!(pipeline.status().state, PipelineState::Stopped);
}

#[test]
fn restart_after_stuck_stop_keeps_cooldown() {
    let config = PipelineConfig {
        detection_threshold: 1,
        history_capacity: 1,
        cooldown: Duration::from_secs(10),
        shutdown_timeout: Duration::from_millis(50),
        ..fast_config()
    };
    let (pipeline, clock, script) = scripted_pipeline(config);
    script.push_weapon();
    script.push_clear();
    script.push_clear();
    script.push_weapon();
    script.push_weapon();
    assert!(pipeline.start());

    pipeline.submit_frame(frame());
    assert!(wait_for_result(&pipeline).alert_active);
    assert!(pipeline.poll_notification().is_some());

    pipeline.submit_frame(frame());
    assert!(!wait_for_result(&pipeline).alert_active);

    script.set_delay(Duration::from_millis(800));
    pipeline.submit_frame(frame());
    wait_until("slow inference to begin", || script.calls() == 3);
    script.set_delay(Duration::ZERO);
    pipeline.stop();

    let restarted = Instant::now();
    assert!(pipeline.start());
    assert!(restarted.elapsed() < Duration::from_millis(500));

    pipeline.submit_frame(frame());
    let within_cooldown = wait_for_result(&pipeline);
    assert_eq!(within_cooldown.source_frame.sequence(), 4);
    assert!(within_cooldown.weapon_detected);
    assert!(!within_cooldown.alert_active);
    assert!(pipeline.poll_notification().is_none());

    clock.advance(Duration::from_secs(11));
    pipeline.submit_frame(frame());
    assert!(wait_for_result(&pipeline).alert_active);
    assert!(pipeline.poll_notification().is_some());
    assert_eq!(pipeline.stats().alerts_raised, 2);
}

#[test]
fn detached_worker_does_not_publish_late_results() {
    let config = PipelineConfig {
        detection_threshold: 1,
        shutdown_timeout: Duration::from_millis(50),
        ..fast_config()
    };
    let (pipeline, _clock, script) = scripted_pipeline(config);
    script.set_delay(Duration::from_millis(300));
    script.push_weapon();
    assert!(pipeline.start());

    pipeline.submit_frame(frame());
    wait_until("inference to begin", || script.calls() == 1);
    pipeline.stop();

    std::thread::sleep(Duration::from_millis(600));
    assert!(pipeline.poll_result().is_none());
    assert!(pipeline.poll_notification().is_none());
    let stats = pipeline.stats();
    assert_eq!(stats.frames_processed, 0);
    assert_eq!(stats.alerts_raised, 0);
}

#[test]
fn status_answers_while_stop_waits() {
    let config = PipelineConfig {
        shutdown_timeout: Duration::from_secs(1),
        ..fast_config()
    };
    let (pipeline, _clock, script) = scripted_pipeline(config);
    script.set_delay(Duration::from_millis(1_500));
    assert!(pipeline.start());
    pipeline.submit_frame(frame());
    wait_until("inference to begin", || script.calls() == 1);

    std::thread::scope(|scope| {
        let stopper = scope.spawn(|| pipeline.stop());
        std::thread::sleep(Duration::from_millis(100));
        let asked = Instant::now();
        assert_eq!(pipeline.status().state, PipelineState::Stopped);
        assert!(asked.elapsed() < Duration::from_millis(200));
        stopper.join().unwrap();
    });
}

#[test]
fn concurrent_producers_are_all_accounted_for() {
    let config = PipelineConfig {
        queue_capacity: 3,
        ..fast_config()
    };
    let (pipeline, _clock, _script) = scripted_pipeline(config);
    assert!(pipeline.start());

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..25 {
                    pipeline.submit_frame(frame());
                }
            });
        }
    });

    let stats = pipeline.stats();
    assert_eq!(stats.frames_submitted, 100);
    assert_eq!(stats.frames_accepted + stats.frames_rejected, 100);
    assert!(pipeline.queued_frames() <= 3);
    pipeline.stop();
    assert_eq!(pipeline.queued_frames(), 0);
}
