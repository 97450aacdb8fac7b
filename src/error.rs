use std::time::Duration;

/// Every error the engine can report.
///
/// Configuration errors are returned synchronously from the setter that
/// caused them. Scan and teardown errors are caught where they happen and
/// handed to the engine's reporter callback instead of unwinding into the host.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("style channel {0} is out of range, channels must be between 0 and 31")]
    ChannelOutOfRange(u32),

    #[error("the buffer's owning thread is gone")]
    OwnerGone,

    #[error("buffer job failed: {0}")]
    BufferJob(String),

    #[error("scan pass panicked: {0}")]
    ScanPanicked(String),

    #[error("scan worker did not stop within {0:?} and was abandoned")]
    WorkerAbandoned(Duration),

    #[error("failed to spawn scan worker: {0}")]
    WorkerSpawn(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
