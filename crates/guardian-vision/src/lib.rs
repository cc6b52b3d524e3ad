pub mod binding;
pub mod capture;
pub mod commands;
pub mod error;
pub mod frame;
pub mod mapping;
pub mod scheduler;
pub mod status;

pub use binding::DetectorBinding;
pub use capture::spawn_capture;
pub use commands::{CommandDispatcher, CommandOutcome, VoiceCommand};
pub use error::SchedulerError;
pub use frame::SharedFrameSlot;
pub use mapping::{default_mapper, MapContext, ResultMapper};
pub use scheduler::{BindingStatus, DetectionScheduler, SchedulerHandle, ShutdownReport};
pub use status::StatusEvent;
