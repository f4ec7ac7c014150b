//! Job scheduling and command execution.
//!
//! - [`schedule`] orders a workflow's jobs by their `needs` and resolves step text
//! - [`cmd`] runs one sub-command at a time through the platform shell
//! - [`trace`] records each command and its output lines to the workflow trace file

pub mod cmd;
pub mod schedule;
pub mod trace;
pub mod types;

pub use cmd::{CommandExecutor, get_shell, split_commands};
pub use schedule::{JobGraph, prepare, run};
pub use trace::{TraceLog, TraceTag};
pub use types::{ExecuteError, PreparedJob, PreparedStep, RunReport, ScheduleError};
