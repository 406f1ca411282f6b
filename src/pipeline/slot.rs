use std::sync::{Mutex, PoisonError};

/// Single-slot handoff with latest-wins writes and destructive reads.
///
/// Consumers only ever see the most recent value; anything not taken before
/// the next `put` is discarded.
pub struct LatestSlot<T> {
    value: Mutex<Option<T>>,
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    /// Store a value, returning the unconsumed one it replaced.
    pub fn put(&self, value: T) -> Option<T> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(value)
    }

    /// Take the current value, leaving the slot empty.
    pub fn take(&self) -> Option<T> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_empty(&self) -> bool {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
