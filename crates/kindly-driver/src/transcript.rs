//! Session-level records that are not part of the result hierarchy.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// A log line the engine emitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub level: String,
    pub source: Option<String>,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

/// Options echo, logs and progress reported during a session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    /// The engine's echo of its effective options.
    pub options: Option<Value>,
    pub logs: Vec<LogEntry>,
    /// Latest reported depth per engine module.
    pub progress: BTreeMap<String, u64>,
    /// Number of records decoded.
    pub records: usize,
}

impl Transcript {
    /// Log entries at `error` level.
    pub fn errors(&self) -> impl Iterator<Item = &LogEntry> {
        self.logs.iter().filter(|l| l.level == "error" || l.level == "fatal")
    }

    /// Deepest bound any module reported.
    pub fn max_progress(&self) -> Option<u64> {
        self.progress.values().copied().max()
    }
}
