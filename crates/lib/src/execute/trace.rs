//! Workflow trace file.
//!
//! One `TAG|payload` line per executed sub-command and per line of its
//! output. The file is truncated when a build starts and only appended to
//! afterwards.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

/// Kind of trace line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceTag {
  /// A sub-command about to run.
  Command,
  /// A line from the child's stdout.
  Info,
  /// A line from the child's stderr.
  Error,
}

impl TraceTag {
  pub fn as_str(&self) -> &'static str {
    match self {
      TraceTag::Command => "COMMAND",
      TraceTag::Info => "INFO",
      TraceTag::Error => "ERROR",
    }
  }
}

impl fmt::Display for TraceTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Append-only trace shared by the executor's stream readers.
#[derive(Debug)]
pub struct TraceLog {
  path: PathBuf,
  file: Mutex<File>,
}

impl TraceLog {
  /// Create (or truncate) the trace file at `path`.
  pub fn create(path: &Path) -> std::io::Result<Self> {
    let file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    Ok(Self {
      path: path.to_path_buf(),
      file: Mutex::new(file),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Append one line and flush it. Write failures are logged, not returned.
  pub fn record(&self, tag: TraceTag, payload: &str) {
    let Ok(mut file) = self.file.lock() else {
      warn!(path = %self.path.display(), "trace file lock poisoned");
      return;
    };
    if let Err(e) = writeln!(file, "{tag}|{payload}").and_then(|_| file.flush()) {
      warn!(path = %self.path.display(), error = %e, "failed to write trace line");
    }
  }
}
