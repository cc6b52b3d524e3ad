use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Raw frame captured from the camera.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Packed BGR8 pixels, row-major.
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }

    /// A black BGR8 frame of the given size.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 3],
        }
    }
}

/// Immutable view of the latest frame handed to detectors.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub frame: Arc<Frame>,
    /// Increments by one for every published frame, starting at 1.
    pub sequence: u64,
    pub captured_at: Instant,
}

/// Horizontal region of the field of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Left,
    Center,
    Right,
}

impl Zone {
    pub fn as_str(self) -> &'static str {
        match self {
            Zone::Left => "left",
            Zone::Center => "center",
            Zone::Right => "right",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub zone: Zone,
    pub distance_cm: f32,
    /// Lower part of the frame, i.e. in the walking path.
    pub in_path: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedFace {
    /// `None` for faces not in the known-faces database.
    pub name: Option<String>,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyReading {
    pub amount: String,
    pub currency: String,
}

/// Detector-specific payload. The scheduler never inspects it; it is handed
/// to the binding's result mapper.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionResult {
    Obstacles(Vec<Obstacle>),
    Faces(Vec<RecognizedFace>),
    Objects(Vec<DetectedObject>),
    Scene(String),
    Text(String),
    Color(String),
    Currency(Option<CurrencyReading>),
}

impl DetectionResult {
    pub fn kind(&self) -> &'static str {
        match self {
            DetectionResult::Obstacles(_) => "obstacles",
            DetectionResult::Faces(_) => "faces",
            DetectionResult::Objects(_) => "objects",
            DetectionResult::Scene(_) => "scene",
            DetectionResult::Text(_) => "text",
            DetectionResult::Color(_) => "color",
            DetectionResult::Currency(_) => "currency",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_frame_is_bgr8_sized() {
        let frame = Frame::blank(4, 3);
        assert_eq!(frame.data.len(), 4 * 3 * 3);
        assert!(frame.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn detection_result_kind() {
        assert_eq!(DetectionResult::Color("red".into()).kind(), "color");
        assert_eq!(DetectionResult::Currency(None).kind(), "currency");
    }
}
