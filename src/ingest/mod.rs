//! Frame ingestion sources for the command-line driver.
//!
//! - Synthetic source (`stub://...`), always available
//! - Directory of still images (feature: ingest-images)
//!
//! Sources hand `Frame`s straight to the pipeline and never persist pixels.

#[cfg(feature = "ingest-images")]
mod images;
mod synthetic;

use anyhow::Result;

use crate::config::SourceSettings;
use crate::frame::Frame;
#[cfg(feature = "ingest-images")]
use images::ImageDirSource;
use synthetic::SyntheticSource;

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub uri: String,
}

pub struct FrameSource {
    backend: SourceBackend,
}

enum SourceBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-images")]
    Images(ImageDirSource),
}

impl FrameSource {
    pub fn new(settings: SourceSettings) -> Result<Self> {
        if settings.uri.starts_with("stub://") {
            Ok(Self {
                backend: SourceBackend::Synthetic(SyntheticSource::new(settings)),
            })
        } else {
            #[cfg(feature = "ingest-images")]
            {
                Ok(Self {
                    backend: SourceBackend::Images(ImageDirSource::new(settings)?),
                })
            }
            #[cfg(not(feature = "ingest-images"))]
            {
                anyhow::bail!(
                    "source '{}' requires the ingest-images feature",
                    settings.uri
                )
            }
        }
    }

    /// Produce the next frame, or `None` once a finite source is exhausted.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-images")]
            SourceBackend::Images(source) => source.next_frame(),
        }
    }

    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            SourceBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-images")]
            SourceBackend::Images(source) => source.stats(),
        }
    }
}
