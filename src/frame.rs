//! Frame buffers handed to the pipeline.
//!
//! A `Frame` owns its pixel bytes. Once submitted, ownership moves into the
//! pipeline and the only frame kept after processing is the one referenced by
//! the latest `FrameResult`.
//!
//! - Pixels are zeroized on drop to limit how long camera imagery lingers in memory.
//! - `Frame` is neither `Clone` nor `Serialize`; results hand the frame back by value.

use sha2::{Digest, Sha256};
use std::time::SystemTime;
use zeroize::Zeroize;

/// Opaque image buffer with an optional capture time.
///
/// The capture time is stamped at admission when the producer did not provide one.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    captured_at: Option<SystemTime>,
    /// Admission sequence number, assigned by the queue.
    sequence: u64,
}

impl Frame {
    /// Create a frame from raw pixel bytes (RGB8 for the bundled backends).
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            captured_at: None,
            sequence: 0,
        }
    }

    /// Attach an explicit capture time.
    pub fn with_capture_time(mut self, captured_at: SystemTime) -> Self {
        self.captured_at = Some(captured_at);
        self
    }

    /// Pixel bytes, read-only. Classifiers must not retain the slice.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn captured_at(&self) -> Option<SystemTime> {
        self.captured_at
    }

    /// Sequence number assigned at admission (0 before admission).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Short content fingerprint used in log lines instead of pixel data.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.data);
        hex::encode(&digest[..6])
    }

    pub(crate) fn admit(&mut self, sequence: u64, now: SystemTime) {
        self.sequence = sequence;
        if self.captured_at.is_none() {
            self.captured_at = Some(now);
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .field("sequence", &self.sequence)
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}
