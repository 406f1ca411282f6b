use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::GenericImageView;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::SourceStats;
use crate::config::SourceSettings;
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Still images from a local directory, in file-name order, decoded to RGB8
/// and resized to the configured frame size.
pub(super) struct ImageDirSource {
    uri: String,
    width: u32,
    height: u32,
    files: Vec<PathBuf>,
    next: usize,
    frame_count: u64,
}

impl ImageDirSource {
    pub fn new(settings: SourceSettings) -> Result<Self> {
        if settings.uri.contains("://") {
            return Err(anyhow!(
                "image ingestion only supports local directories (got {})",
                settings.uri
            ));
        }
        let dir = Path::new(&settings.uri);
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("failed to read image directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        files.sort();
        if files.is_empty() {
            return Err(anyhow!("no images found in {}", dir.display()));
        }
        log::info!(
            "FrameSource: {} images queued from {}",
            files.len(),
            dir.display()
        );
        Ok(Self {
            uri: settings.uri,
            width: settings.width,
            height: settings.height,
            files,
            next: 0,
            frame_count: 0,
        })
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        let (pixels, width, height) = decode_image(path, self.width, self.height)?;
        self.frame_count += 1;
        Ok(Some(
            Frame::new(pixels, width, height).with_capture_time(SystemTime::now()),
        ))
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            uri: self.uri.clone(),
        }
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn decode_image(path: &Path, width: u32, height: u32) -> Result<(Vec<u8>, u32, u32)> {
    let mut image = image::open(path).with_context(|| format!("decode {}", path.display()))?;
    if image.dimensions() != (width, height) {
        image = image.resize_exact(width, height, FilterType::Triangle);
    }
    let (width, height) = image.dimensions();
    let rgb = image.into_rgb8();
    Ok((rgb.into_raw(), width, height))
}
