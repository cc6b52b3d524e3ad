//! Stand-ins for the camera and the vision models, used by `guardian simulate`.

use guardian_core::detection::{CurrencyReading, DetectedObject, Obstacle, RecognizedFace, Zone};
use guardian_core::{DetectionResult, Detector, Frame, FrameGrabber, Source};
use rand::seq::IndexedRandom;
use rand::RngExt;

const OBJECT_LABELS: &[&str] = &["chair", "table", "cup", "door", "laptop", "bottle", "person", "book"];
const SCENES: &[&str] = &[
    "An indoor room with a table and chairs",
    "A hallway with a door at the end",
    "A kitchen counter with a few items on it",
    "An office desk with a laptop",
];
const COLORS: &[&str] = &["red", "blue", "green", "white", "black", "yellow"];
const TEXTS: &[&str] = &["Exit", "Push to open", "Room 204", ""];
const BILLS: &[&str] = &["5", "10", "20", "50"];

/// Synthetic camera producing frames with a moving brightness value.
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    tick: u8,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, tick: 0 }
    }
}

impl FrameGrabber for SyntheticCamera {
    fn grab(&mut self) -> anyhow::Result<Frame> {
        self.tick = self.tick.wrapping_add(1);
        let len = self.width as usize * self.height as usize * 3;
        Ok(Frame::new(self.width, self.height, vec![self.tick; len]))
    }
}

pub struct SimulatedObstacles;

impl Detector for SimulatedObstacles {
    fn name(&self) -> &str {
        "simulated-obstacles"
    }

    fn detect(&mut self, _frame: &Frame) -> anyhow::Result<DetectionResult> {
        let mut rng = rand::rng();
        let count = rng.random_range(0..=2);
        let obstacles = (0..count)
            .map(|_| Obstacle {
                zone: *[Zone::Left, Zone::Center, Zone::Right].choose(&mut rng).unwrap_or(&Zone::Center),
                distance_cm: rng.random_range(30.0..400.0),
                in_path: rng.random_bool(0.7),
            })
            .collect();
        Ok(DetectionResult::Obstacles(obstacles))
    }
}

pub struct SimulatedFaces {
    known: Vec<String>,
}

impl SimulatedFaces {
    pub fn new(known: Vec<String>) -> Self {
        Self { known }
    }
}

impl Detector for SimulatedFaces {
    fn name(&self) -> &str {
        "simulated-faces"
    }

    fn detect(&mut self, _frame: &Frame) -> anyhow::Result<DetectionResult> {
        let mut rng = rand::rng();
        let mut faces = Vec::new();
        if rng.random_bool(0.3) {
            if let Some(name) = self.known.choose(&mut rng) {
                faces.push(RecognizedFace {
                    name: Some(name.clone()),
                    confidence: rng.random_range(0.6..0.99),
                });
            }
        }
        if rng.random_bool(0.1) {
            faces.push(RecognizedFace {
                name: None,
                confidence: rng.random_range(0.3..0.6),
            });
        }
        Ok(DetectionResult::Faces(faces))
    }
}

pub struct SimulatedObjects;

impl Detector for SimulatedObjects {
    fn name(&self) -> &str {
        "simulated-objects"
    }

    fn detect(&mut self, _frame: &Frame) -> anyhow::Result<DetectionResult> {
        let mut rng = rand::rng();
        let count = rng.random_range(0..=4);
        let objects = (0..count)
            .map(|_| DetectedObject {
                label: OBJECT_LABELS.choose(&mut rng).copied().unwrap_or("chair").to_string(),
                confidence: rng.random_range(0.3..0.99),
            })
            .collect();
        Ok(DetectionResult::Objects(objects))
    }
}

/// Picks one entry of a fixed phrase list per call.
pub struct SimulatedPhrases {
    name: &'static str,
    phrases: &'static [&'static str],
    wrap: fn(String) -> DetectionResult,
}

impl Detector for SimulatedPhrases {
    fn name(&self) -> &str {
        self.name
    }

    fn detect(&mut self, _frame: &Frame) -> anyhow::Result<DetectionResult> {
        let phrase = self.phrases.choose(&mut rand::rng()).copied().unwrap_or_default();
        Ok((self.wrap)(phrase.to_string()))
    }
}

pub struct SimulatedCurrency;

impl Detector for SimulatedCurrency {
    fn name(&self) -> &str {
        "simulated-currency"
    }

    fn detect(&mut self, _frame: &Frame) -> anyhow::Result<DetectionResult> {
        let mut rng = rand::rng();
        if !rng.random_bool(0.8) {
            return Ok(DetectionResult::Currency(None));
        }
        let amount = BILLS.choose(&mut rng).copied().unwrap_or("1");
        Ok(DetectionResult::Currency(Some(CurrencyReading {
            amount: amount.to_string(),
            currency: "dollars".to_string(),
        })))
    }
}

/// One simulated detector per source the runtime knows about.
pub fn detectors(known_faces: Vec<String>) -> Vec<(Source, Box<dyn Detector>)> {
    let mut out: Vec<(Source, Box<dyn Detector>)> = Vec::new();
    out.push((Source::Obstacle, Box::new(SimulatedObstacles)));
    out.push((Source::Face, Box::new(SimulatedFaces::new(known_faces))));
    out.push((Source::Object, Box::new(SimulatedObjects)));
    out.push((
        Source::Scene,
        Box::new(SimulatedPhrases {
            name: "simulated-scene",
            phrases: SCENES,
            wrap: DetectionResult::Scene,
        }),
    ));
    out.push((
        Source::Ocr,
        Box::new(SimulatedPhrases {
            name: "simulated-ocr",
            phrases: TEXTS,
            wrap: DetectionResult::Text,
        }),
    ));
    out.push((
        Source::Color,
        Box::new(SimulatedPhrases {
            name: "simulated-color",
            phrases: COLORS,
            wrap: DetectionResult::Color,
        }),
    ));
    out.push((Source::Currency, Box::new(SimulatedCurrency)));
    out
}
