pub mod events;
pub mod queue;
pub mod speaker;
pub mod tts;

pub use events::SpeechEvent;
pub use queue::{Admission, AnnouncementQueue, Delivery, Dequeued, QueueStats, RejectReason};
pub use speaker::{panic_message, SpeakerHandle, SpeakerState, SpeakerWorker};
pub use tts::{engine_from_config, ConsoleTts, PiperTts};
