use std::collections::VecDeque;

/// Sliding window of per-frame "weapon present" flags.
///
/// Oldest entries are evicted once the window is full. The positive count is
/// maintained incrementally and only ever reflects entries still in the window.
#[derive(Clone, Debug)]
pub struct DetectionHistory {
    window: VecDeque<bool>,
    capacity: usize,
    positives: usize,
}

impl DetectionHistory {
    /// Create an empty window. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            positives: 0,
        }
    }

    pub fn push(&mut self, weapon_present: bool) {
        while self.window.len() >= self.capacity {
            if let Some(true) = self.window.pop_front() {
                self.positives -= 1;
            }
        }
        self.window.push_back(weapon_present);
        if weapon_present {
            self.positives += 1;
        }
    }

    /// Number of `true` entries currently in the window.
    pub fn count_true(&self) -> usize {
        self.positives
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Window contents, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.window.iter().copied()
    }
}
