//! Append-only JSONL event sinks.
//!
//! One record per line. Write failures are swallowed: observability must
//! never block the guarded workflow. Consumers treat the streams as
//! parse-tolerant, unknown fields ignored.

use serde_json::Value as JsonValue;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct JsonlLogger {
    path: PathBuf,
}

impl JsonlLogger {
    pub fn new(path: PathBuf) -> Self {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self { path }
    }

    /// Appends one record. Best-effort: errors are dropped.
    pub fn write(&self, record: &JsonValue) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(_) => return,
        };
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{}", line);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The five sinks the guard writes, rooted at the configured log dir.
#[derive(Debug, Clone)]
pub struct LogSinks {
    pub events: JsonlLogger,
    pub tool_pre: JsonlLogger,
    pub tool_post: JsonlLogger,
    pub validation: JsonlLogger,
    pub stop_gate: JsonlLogger,
}

impl LogSinks {
    pub fn new(log_dir: &Path) -> Self {
        Self {
            events: JsonlLogger::new(log_dir.join("events.jsonl")),
            tool_pre: JsonlLogger::new(log_dir.join("tool_pre.jsonl")),
            tool_post: JsonlLogger::new(log_dir.join("tool_post.jsonl")),
            validation: JsonlLogger::new(log_dir.join("validation.jsonl")),
            stop_gate: JsonlLogger::new(log_dir.join("stop_gate.jsonl")),
        }
    }
}
