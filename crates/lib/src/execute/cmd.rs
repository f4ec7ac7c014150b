//! Step command execution.
//!
//! A step's `run` text is split into sub-commands on `;` and line breaks
//! outside quotes. A line ending in `\` continues onto the next one.
//! Each sub-command either changes the executor's working directory (`cd`)
//! or runs in a child shell with its stdout and stderr drained concurrently.
//! Output lines go to the trace file and to the `hpb::command` log target.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use super::trace::{TraceLog, TraceTag};
use super::types::ExecuteError;

/// Log target for child process output.
pub const COMMAND_TARGET: &str = "hpb::command";

/// Emitted in place of a line that is neither UTF-8 nor GB18030.
pub const DECODE_FAILED: &str = "*** failed decode ***";

/// Runs sub-commands, tracking the working directory across calls.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
  cwd: PathBuf,
  shell: Option<String>,
  trace: Option<Arc<TraceLog>>,
}

impl CommandExecutor {
  pub fn new(cwd: impl Into<PathBuf>) -> Self {
    Self {
      cwd: cwd.into(),
      shell: None,
      trace: None,
    }
  }

  /// Use `shell` (e.g. `bash` or `bash -c`) instead of the platform default.
  pub fn with_shell(mut self, shell: Option<String>) -> Self {
    self.shell = shell;
    self
  }

  pub fn with_trace(mut self, trace: Arc<TraceLog>) -> Self {
    self.trace = Some(trace);
    self
  }

  /// Directory the next sub-command runs in.
  pub fn cwd(&self) -> &Path {
    &self.cwd
  }

  /// Run one sub-command.
  pub async fn exec(&mut self, command: &str) -> Result<(), ExecuteError> {
    let command = command.trim();
    if command.is_empty() {
      return Ok(());
    }

    info!(cmd = %command, cwd = %self.cwd.display(), "run command");
    if let Some(trace) = &self.trace {
      trace.record(TraceTag::Command, command);
    }

    if command == "cd" {
      return Ok(());
    }
    if let Some(target) = command.strip_prefix("cd ") {
      return self.change_dir(target);
    }

    self.spawn(&join_continuations(command)).await
  }

  fn change_dir(&mut self, target: &str) -> Result<(), ExecuteError> {
    let target = target.trim().trim_matches(|c| c == '"' || c == '\'');
    if target.is_empty() {
      return Ok(());
    }

    let joined = self.cwd.join(target);
    let resolved = dunce::canonicalize(&joined).map_err(|source| ExecuteError::ChangeDir {
      path: joined.clone(),
      source,
    })?;
    if !resolved.is_dir() {
      return Err(ExecuteError::NotADirectory(resolved));
    }

    debug!(from = %self.cwd.display(), to = %resolved.display(), "change directory");
    self.cwd = resolved;
    Ok(())
  }

  async fn spawn(&self, command: &str) -> Result<(), ExecuteError> {
    let (shell_cmd, shell_args) = get_shell(self.shell.as_deref());

    let mut child = Command::new(&shell_cmd)
      .args(&shell_args)
      .arg(command)
      .current_dir(&self.cwd)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|source| ExecuteError::Spawn {
        cmd: command.to_string(),
        source,
      })?;

    let readers = [
      child
        .stdout
        .take()
        .map(|out| tokio::spawn(drain(out, TraceTag::Info, self.trace.clone()))),
      child
        .stderr
        .take()
        .map(|err| tokio::spawn(drain(err, TraceTag::Error, self.trace.clone()))),
    ];

    for reader in readers.into_iter().flatten() {
      match reader.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "failed reading command output"),
        Err(e) => warn!(error = %e, "output reader task failed"),
      }
    }

    let status = match child.wait().await {
      Ok(status) => status,
      Err(source) => {
        let _ = child.start_kill();
        return Err(ExecuteError::Wait {
          cmd: command.to_string(),
          source,
        });
      }
    };

    if !status.success() {
      error!(cmd = %command, code = ?status.code(), "command failed");
      return Err(ExecuteError::CmdFailed {
        cmd: command.to_string(),
        code: status.code(),
      });
    }

    Ok(())
  }
}

/// Forward every line of `reader` to the log and the trace.
async fn drain<R>(reader: R, tag: TraceTag, trace: Option<Arc<TraceLog>>) -> std::io::Result<()>
where
  R: AsyncRead + Unpin,
{
  let mut lines = BufReader::new(reader).split(b'\n');

  while let Some(line) = lines.next_segment().await? {
    let decoded = decode_line(&line);
    let text = decoded.trim();

    match tag {
      TraceTag::Error => error!(target: COMMAND_TARGET, "{text}"),
      _ => info!(target: COMMAND_TARGET, "{text}"),
    }
    if let Some(trace) = &trace {
      trace.record(tag, text);
    }
  }

  Ok(())
}

/// Decode a line as UTF-8, falling back to GB18030, then to a placeholder.
pub fn decode_line(bytes: &[u8]) -> Cow<'_, str> {
  if let Ok(text) = std::str::from_utf8(bytes) {
    return Cow::Borrowed(text);
  }

  let (text, had_errors) = encoding_rs::GB18030.decode_without_bom_handling(bytes);
  if had_errors { Cow::Borrowed(DECODE_FAILED) } else { text }
}

/// Remove backslash line continuations.
pub fn join_continuations(command: &str) -> String {
  command.replace("\\\r\n", "").replace("\\\n", "").replace("\\\r", "")
}

/// Split step text into sub-commands on `;` or newlines outside single or
/// double quotes.
///
/// A newline after a `\` continuation does not split; the continuation is
/// removed when the sub-command runs. Sub-commands are trimmed and empty
/// ones dropped. Quotes are kept.
pub fn split_commands(text: &str) -> Vec<String> {
  let mut commands = Vec::new();
  let mut current = String::new();
  let mut quote: Option<char> = None;

  for c in text.chars() {
    match (quote, c) {
      (None, ';') => {
        commands.push(std::mem::take(&mut current));
        continue;
      }
      (None, '\n') if !current.trim_end_matches('\r').ends_with('\\') => {
        commands.push(std::mem::take(&mut current));
        continue;
      }
      (None, '"' | '\'') => quote = Some(c),
      (Some(q), _) if q == c => quote = None,
      _ => {}
    }
    current.push(c);
  }
  commands.push(current);

  commands
    .into_iter()
    .map(|c| c.trim().to_string())
    .filter(|c| !c.is_empty())
    .collect()
}

/// Get the shell command and arguments for the current platform.
///
/// An override may carry its own arguments (`bash -eu -c`). Without any,
/// the flag is chosen from the shell's name.
pub fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let mut parts = shell.split_whitespace().map(str::to_string);
    if let Some(program) = parts.next() {
      let given: Vec<String> = parts.collect();
      if !given.is_empty() {
        return (program, given);
      }

      let args = if program.contains("powershell") || program.contains("pwsh") {
        vec!["-NoProfile".to_string(), "-Command".to_string()]
      } else if program.contains("cmd") {
        vec!["/C".to_string()]
      } else {
        vec!["-c".to_string()]
      };
      return (program, args);
    }
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}
