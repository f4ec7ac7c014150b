//! Types for job execution.

use std::path::PathBuf;

use thiserror::Error;

use crate::vars::VarError;

/// Errors that can occur while running a sub-command.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// Command exited with a non-zero status.
  #[error("command failed with exit code {code:?}: {cmd}")]
  CmdFailed { cmd: String, code: Option<i32> },

  /// The shell could not be started.
  #[error("failed to spawn '{cmd}': {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  /// Waiting for the child failed; the child has been killed.
  #[error("failed waiting for '{cmd}': {source}")]
  Wait {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  #[error("cannot change directory to '{path}': {source}")]
  ChangeDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("not a directory: {0}")]
  NotADirectory(PathBuf),
}

impl ExecuteError {
  /// Exit code of a failed command, if it exited normally.
  pub fn exit_code(&self) -> Option<i32> {
    match self {
      ExecuteError::CmdFailed { code, .. } => *code,
      _ => None,
    }
  }
}

/// Errors from ordering, preparing or running jobs.
#[derive(Debug, Error)]
pub enum ScheduleError {
  /// The `needs` graph has a cycle; `jobs` are those left unordered.
  #[error("cycle in job dependencies involving: {}", jobs.join(", "))]
  Cycle { jobs: Vec<String> },

  #[error("job '{job}' needs unknown job '{need}'")]
  UnknownNeed { job: String, need: String },

  /// A step's text or skip condition references an undefined variable.
  #[error("job '{job}' step {step}: {source}")]
  Unresolved {
    job: String,
    step: usize,
    #[source]
    source: VarError,
  },

  #[error("job '{job}' step {step} failed: {source}")]
  Step {
    job: String,
    step: usize,
    #[source]
    source: ExecuteError,
  },
}

/// A step ready to run: skip decided, commands split and resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStep {
  pub index: usize,
  pub name: String,
  pub skip: bool,
  pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedJob {
  pub name: String,
  pub steps: Vec<PreparedStep>,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
  /// Jobs in the order they ran.
  pub jobs: Vec<String>,
  pub steps_run: usize,
  pub steps_skipped: usize,
  pub commands_run: usize,
}
