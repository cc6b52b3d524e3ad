use guardian_core::{Priority, Source};
use uuid::Uuid;

/// Events from the speaker worker to observers (CLI, tests).
#[derive(Debug, Clone)]
pub enum SpeechEvent {
    Speaking {
        id: Uuid,
        source: Source,
        priority: Priority,
        text: String,
    },
    Finished {
        id: Uuid,
    },
    Interrupted {
        id: Uuid,
    },
    Failed {
        id: Uuid,
        error: String,
    },
    Stopped,
}
