use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use crate::frame::Frame;
use crate::pipeline::AdmissionPolicy;

/// Outcome of offering a frame to the admission queue.
#[derive(Debug)]
pub enum Admission {
    Queued,
    /// Queued after evicting the oldest pending frame.
    QueuedEvicting(Frame),
    /// Queue full under `Reject`; the frame is handed back.
    Rejected(Frame),
}

impl Admission {
    pub fn accepted(&self) -> bool {
        !matches!(self, Admission::Rejected(_))
    }
}

struct QueueState {
    frames: VecDeque<Frame>,
    next_sequence: u64,
    interrupted: bool,
}

/// Bounded frame buffer between producers and the inference worker.
///
/// Producers never wait on backpressure: a full queue either rejects or
/// drops its oldest frame. Only the consumer side blocks, and only up to a
/// caller-supplied timeout.
pub struct AdmissionQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    capacity: usize,
    policy: AdmissionPolicy,
}

impl AdmissionQueue {
    /// Create a queue. A zero capacity is raised to one.
    pub fn new(capacity: usize, policy: AdmissionPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity),
                next_sequence: 1,
                interrupted: false,
            }),
            ready: Condvar::new(),
            capacity,
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer a frame. Stamps its sequence number and missing capture time.
    pub fn push(&self, mut frame: Frame, now: SystemTime) -> Admission {
        let mut state = self.lock();
        let mut evicted = None;
        if state.frames.len() >= self.capacity {
            match self.policy {
                AdmissionPolicy::Reject => return Admission::Rejected(frame),
                AdmissionPolicy::DropOldest => evicted = state.frames.pop_front(),
            }
        }
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        frame.admit(sequence, now);
        state.frames.push_back(frame);
        drop(state);
        self.ready.notify_one();

        match evicted {
            Some(old) => Admission::QueuedEvicting(old),
            None => Admission::Queued,
        }
    }

    /// Take the oldest frame, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout or when `interrupt` is called.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        let state = self.lock();
        let (mut state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |s| s.frames.is_empty() && !s.interrupted)
            .unwrap_or_else(PoisonError::into_inner);
        state.frames.pop_front()
    }

    /// Wake waiting consumers so they can observe a stop request.
    pub fn interrupt(&self) {
        self.lock().interrupted = true;
        self.ready.notify_all();
    }

    /// Re-arm blocking waits after an `interrupt`.
    pub fn resume(&self) {
        self.lock().interrupted = false;
    }

    /// Drop all pending frames, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let discarded = state.frames.len();
        state.frames.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Sequence numbers of pending frames, oldest first.
    pub fn pending_sequences(&self) -> Vec<u64> {
        self.lock().frames.iter().map(Frame::sequence).collect()
    }
}
