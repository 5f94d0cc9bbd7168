//! Index rebuild progress reporting.
//!
//! Reports observable progress during `rsp rebuild` so users see how much of
//! the store has been indexed. Imports print a summary instead. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for a rebuild.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RebuildEvent {
    /// The raw store is being listed. Total unknown.
    Scanning { index: String },
    /// `n` stored files processed out of `total`.
    Indexing { index: String, n: u64, total: u64 },
    /// Rebuild finished.
    Done {
        index: String,
        indexed: u64,
        failed: u64,
    },
}

/// Reports rebuild progress. Implementations write to stderr (human or JSON).
pub trait RebuildProgressReporter: Send + Sync {
    fn report(&self, event: RebuildEvent);
}

/// Human-friendly progress on stderr: "rebuild rsp  indexing  1,234 / 5,000 documents".
pub struct StderrProgress;

impl RebuildProgressReporter for StderrProgress {
    fn report(&self, event: RebuildEvent) {
        let line = match &event {
            RebuildEvent::Scanning { index } => format!("rebuild {}  scanning store...\n", index),
            RebuildEvent::Indexing { index, n, total } => format!(
                "rebuild {}  indexing  {} / {} documents\n",
                index,
                format_number(*n),
                format_number(*total)
            ),
            RebuildEvent::Done {
                index,
                indexed,
                failed,
            } => format!(
                "rebuild {}  done  {} indexed, {} failed\n",
                index,
                format_number(*indexed),
                format_number(*failed)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &RebuildEvent) -> serde_json::Value {
        match event {
            RebuildEvent::Scanning { index } => serde_json::json!({
                "event": "progress",
                "index": index,
                "phase": "scanning"
            }),
            RebuildEvent::Indexing { index, n, total } => serde_json::json!({
                "event": "progress",
                "index": index,
                "phase": "indexing",
                "n": n,
                "total": total
            }),
            RebuildEvent::Done {
                index,
                indexed,
                failed,
            } => serde_json::json!({
                "event": "done",
                "index": index,
                "indexed": indexed,
                "failed": failed
            }),
        }
    }
}

impl RebuildProgressReporter for JsonProgress {
    fn report(&self, event: RebuildEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl RebuildProgressReporter for NoProgress {
    fn report(&self, _event: RebuildEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn RebuildProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
