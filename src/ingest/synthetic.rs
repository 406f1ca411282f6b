use anyhow::Result;
use std::time::SystemTime;

use super::SourceStats;
use crate::config::SourceSettings;
use crate::frame::Frame;

/// Endless generated frames for demos and tests.
pub(super) struct SyntheticSource {
    settings: SourceSettings,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(settings: SourceSettings) -> Self {
        log::info!("FrameSource: using synthetic frames for {}", settings.uri);
        Self {
            settings,
            frame_count: 0,
            scene_state: 0,
        }
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Ok(Some(
            Frame::new(pixels, self.settings.width, self.settings.height)
                .with_capture_time(SystemTime::now()),
        ))
    }

    /// Slowly shifting gradient; the scene changes every 50 frames.
    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = self.settings.width as usize * self.settings.height as usize * 3;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        (0..pixel_count)
            .map(|i| ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8)
            .collect()
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            uri: self.settings.uri.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_vary_between_captures() {
        let mut source = SyntheticSource::new(SourceSettings {
            uri: "stub://test".to_string(),
            target_fps: 1,
            width: 4,
            height: 2,
        });
        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(first.byte_len(), 4 * 2 * 3);
        assert!(first.captured_at().is_some());
        assert_ne!(first.fingerprint(), second.fingerprint());
    }
}
