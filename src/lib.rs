//! Background URL and email highlighting for editor text buffers.
//!
//! A [`UrlEngine`] watches one buffer. Text and viewport notifications mark
//! it stale; a scan worker (or the host's own timer via [`UrlEngine::tick`])
//! rescans the relevant region, unifies the pattern matches and repaints
//! them through the [`BufferHost`] on the buffer's owning thread.

pub mod engine;
pub mod error;
pub mod host;
pub mod model;
pub mod scan;
pub mod time_source;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use engine::{
    ConfigField, EngineBuilder, EngineKey, ErrorReporter, ScanOutcome, SchedulerState, Supervisor,
    UrlEngine,
};
pub use error::{Error, Result};
pub use host::{BufferHost, BufferJob, ChannelHost, TextBuffer, with_buffer};
pub use model::buffer::RopeBuffer;
pub use model::channel::StyleChannel;
pub use model::config::{EngineConfig, EngineSettings, StopPolicy};
pub use model::url_match::UrlMatch;
pub use scan::{PatternKind, PatternSet};
pub use time_source::{RealTimeSource, SharedTimeSource, TestTimeSource, TimeSource};

/// Locks `mutex`, recovering the data if a previous holder panicked. Scan
/// panics are caught and reported, so a poisoned lock is not fatal here.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
