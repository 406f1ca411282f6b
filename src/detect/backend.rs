use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Classifier adapter trait.
///
/// Wraps an external object detector behind a single `infer` call. The
/// pipeline invokes it from exactly one worker thread.
///
/// Implementations MUST:
/// - Treat the frame pixels as read-only and not retain them past `infer`
/// - Report per-frame failures as `Err` rather than panicking
///
/// An `Err` from `infer` skips that frame; it never stops the pipeline.
pub trait Classifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Readiness check run by `Pipeline::start`.
    ///
    /// An error here means the capability is unavailable and the pipeline
    /// refuses to start. Must be safe to call more than once.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        (**self).infer(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
