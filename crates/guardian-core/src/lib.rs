pub mod announcement;
pub mod config;
pub mod detection;
pub mod error;
pub mod interfaces;
pub mod lifecycle;

pub use announcement::{Announcement, Priority, Source};
pub use config::AppConfig;
pub use detection::{DetectionResult, Frame, FrameSnapshot};
pub use error::{ConfigError, TtsError};
pub use interfaces::{
    CancelToken, Detector, FrameGrabber, FrameSource, SpeechInterrupt, SpeechOutcome, TextToSpeech,
};
