//! Observers receive progress and warning messages from the demultiplexing core.
//!
//! The core never logs through a global handle; callers pass an observer in.
//! [`LogObserver`] forwards to the `log` facade, [`RecordingObserver`] keeps
//! messages in memory so tests can assert on them.

use std::sync::Mutex;

/// Severity of an observed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
}

/// Sink for messages emitted while demultiplexing.
///
/// Implementations must be shareable across the rayon workers that partition
/// tag columns and cell rows.
pub trait DemuxObserver: Send + Sync {
    fn emit(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.emit(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.emit(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.emit(Level::Warn, message);
    }
}

/// Forwards every message to the `log` crate under the `hto_demux` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl DemuxObserver for LogObserver {
    fn emit(&self, level: Level, message: &str) {
        match level {
            Level::Debug => log::debug!(target: "hto_demux", "{}", message),
            Level::Info => log::info!(target: "hto_demux", "{}", message),
            Level::Warn => log::warn!(target: "hto_demux", "{}", message),
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl DemuxObserver for NullObserver {
    fn emit(&self, _level: Level, _message: &str) {}
}

/// Keeps messages in arrival order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    messages: Mutex<Vec<(Level, String)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn messages(&self) -> Vec<(Level, String)> {
        match self.messages.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Messages recorded at `Level::Warn`.
    pub fn warnings(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(level, _)| *level == Level::Warn)
            .map(|(_, message)| message)
            .collect()
    }
}

impl DemuxObserver for RecordingObserver {
    fn emit(&self, level: Level, message: &str) {
        let mut guard = match self.messages.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push((level, message.to_string()));
    }
}
