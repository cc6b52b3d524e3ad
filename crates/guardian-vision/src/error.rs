use guardian_core::Source;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no detector bound for {0}")]
    UnknownSource(Source),

    #[error("more than one detector bound for {0}")]
    DuplicateSource(Source),

    #[error("{0} detector is disabled")]
    Disabled(Source),

    #[error("{0} detector has a zero cadence")]
    ZeroCadence(Source),

    #[error("scheduler is shut down")]
    ShutDown,

    #[error("failed to spawn detector thread: {0}")]
    Spawn(#[from] std::io::Error),
}
