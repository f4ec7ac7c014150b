//! Implementation of the `hpb build` command.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};

use hpb_lib::settings::Settings;
use hpb_lib::workflow::{BuildMode, BuildRequest, WorkflowEngine};

use crate::output::{format_duration, print_error, print_stat, print_success};

pub struct BuildArgs {
  pub config: PathBuf,
  pub dir: PathBuf,
  pub mode: BuildMode,
  pub task_name: Option<String>,
  pub task_id: Option<String>,
  pub params: Vec<String>,
}

impl BuildArgs {
  /// The build request, with its task name and id fixed.
  pub fn into_request(self) -> Result<BuildRequest> {
    let working_dir = dunce::canonicalize(&self.dir)
      .with_context(|| format!("Working directory not found: {}", self.dir.display()))?;

    let mut request = BuildRequest::new(working_dir, self.config)
      .with_mode(self.mode)
      .with_params(self.params);
    request.task_name = self.task_name;
    request.task_id = self.task_id;
    Ok(request.pinned())
  }
}

/// Run `request` and print a summary.
pub fn cmd_build(request: &BuildRequest, settings: Settings) -> Result<()> {
  let engine = WorkflowEngine::new(settings).context("Failed to set up build")?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let start = Instant::now();
  let report = match rt.block_on(engine.run(request)) {
    Ok(report) => report,
    Err(e) => {
      if let Some(code) = e.exit_code() {
        print_error(&format!("Step exited with code {code}"));
      }
      return Err(e).context("Build failed");
    }
  };

  println!();
  print_success(&format!("Built {}", report.meta.key()));
  print_stat("Build type", &report.meta.build.build_type);
  print_stat("Jobs", &report.run.jobs.join(", "));
  print_stat("Steps run", &report.run.steps_run.to_string());
  print_stat("Steps skipped", &report.run.steps_skipped.to_string());
  print_stat("Dependencies", &report.deps.len().to_string());
  print_stat("Source", &report.source_path.display().to_string());
  print_stat("Metadata", &report.meta_file.display().to_string());
  print_stat("Trace", &report.trace_file.display().to_string());
  print_stat("Log", &report.dirs.log_file().display().to_string());
  print_stat("Duration", &format_duration(start.elapsed()));

  Ok(())
}
