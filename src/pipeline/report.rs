use serde::Serialize;

use crate::detect::Detection;
use crate::pipeline::alert::Notification;
use crate::pipeline::FrameResult;

/// Response body for a detection poll, in the shape HTTP handlers return.
///
/// The result is the latest snapshot, not necessarily the frame the caller
/// just submitted.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DetectionReport {
    pub weapons_detected: bool,
    pub alert_triggered: bool,
    pub detections: Vec<ReportedDetection>,
    pub notification: bool,
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportedDetection {
    pub class: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
}

impl From<&Detection> for ReportedDetection {
    fn from(detection: &Detection) -> Self {
        Self {
            class: detection.label.clone(),
            confidence: detection.confidence,
            bbox: detection.bbox.as_array(),
        }
    }
}

impl DetectionReport {
    pub fn new(result: Option<&FrameResult>, notification: Option<&Notification>) -> Self {
        let mut report = match result {
            Some(result) => Self {
                weapons_detected: result.weapon_detected,
                alert_triggered: result.alert_active,
                detections: result.detections.iter().map(ReportedDetection::from).collect(),
                ..Self::default()
            },
            None => Self::default(),
        };
        if let Some(notification) = notification {
            report.notification = true;
            report.message = Some(notification.message.clone());
        }
        report
    }

    /// True when there is anything worth showing a human.
    pub fn is_noteworthy(&self) -> bool {
        self.weapons_detected || self.alert_triggered || self.notification
    }
}
