//! Debounced, cooldown-gated alert state machine.
//!
//! States are `inactive` and `active`, starting inactive with a last trigger
//! time of the UNIX epoch.
//!
//! - inactive -> active when the window holds at least `detection_threshold`
//!   positives AND more than `cooldown` has elapsed since the last trigger.
//!   This edge, and only this edge, emits a `Notification`.
//! - active -> inactive as soon as the window holds zero positives. Cooldown
//!   does not gate deactivation.

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock source for cooldown checks and timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually advanced clock for deterministic tests and replays.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<SystemTime>>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Start at `secs` seconds after the UNIX epoch.
    pub fn at_secs(secs: u64) -> Self {
        Self::new(UNIX_EPOCH + Duration::from_secs(secs))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    pub fn set(&self, to: SystemTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Human-visible alert raised on activation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notification {
    pub message: String,
    pub timestamp: SystemTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlertState {
    pub active: bool,
    pub last_trigger_time: SystemTime,
}

impl Default for AlertState {
    fn default() -> Self {
        Self {
            active: false,
            last_trigger_time: UNIX_EPOCH,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AlertTransition {
    Activated(Notification),
    Deactivated,
}

#[derive(Clone, Debug)]
pub struct AlertStateMachine {
    state: AlertState,
    detection_threshold: usize,
    cooldown: Duration,
    message: String,
}

impl AlertStateMachine {
    pub fn new(detection_threshold: usize, cooldown: Duration, message: impl Into<String>) -> Self {
        Self {
            state: AlertState::default(),
            detection_threshold,
            cooldown,
            message: message.into(),
        }
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    /// Evaluate one step given the window's positive count at `now`.
    pub fn evaluate(&mut self, positives: usize, now: SystemTime) -> Option<AlertTransition> {
        if !self.state.active {
            if positives >= self.detection_threshold && self.cooldown_elapsed(now) {
                self.state.active = true;
                self.state.last_trigger_time = now;
                return Some(AlertTransition::Activated(Notification {
                    message: self.message.clone(),
                    timestamp: now,
                }));
            }
        } else if positives == 0 {
            self.state.active = false;
            return Some(AlertTransition::Deactivated);
        }
        None
    }

    /// A clock that moved backwards counts as zero elapsed time.
    fn cooldown_elapsed(&self, now: SystemTime) -> bool {
        let elapsed = now
            .duration_since(self.state.last_trigger_time)
            .unwrap_or(Duration::ZERO);
        elapsed > self.cooldown
    }
}
