mod cmd;
mod output;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use hpb_lib::repo::SearchQuery;
use hpb_lib::settings::{LogSettings, Settings};
use hpb_lib::workflow::BuildMode;

use cmd::{BuildArgs, cmd_build, cmd_pull, cmd_search};

/// hpb - build source packages from declarative workflows
#[derive(Parser)]
#[command(name = "hpb")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Settings file (default: searched in the configuration directories)
  #[arg(long, global = true)]
  settings: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow
  Build {
    /// Workflow file, relative to the working directory
    #[arg(short, long)]
    config: PathBuf,

    /// Working directory (project root)
    #[arg(short = 'd', long, default_value = ".")]
    dir: PathBuf,

    /// Directory layout: dev or task
    #[arg(short, long, default_value = "dev")]
    mode: BuildMode,

    /// Task name (default: the workflow file name up to its first '.')
    #[arg(long)]
    task_name: Option<String>,

    /// Task id (default: current time)
    #[arg(long)]
    task_id: Option<String>,

    /// Workflow parameter as key=value, repeatable
    #[arg(short, long = "param")]
    params: Vec<String>,
  },

  /// Search the configured package repositories
  Search {
    #[arg(short, long)]
    maintainer: String,

    #[arg(short, long)]
    name: String,

    #[arg(short, long, default_value = "")]
    tag: String,

    #[arg(long, default_value = "")]
    system: String,

    #[arg(long, default_value = "")]
    machine: String,

    #[arg(long, default_value = "")]
    build_type: String,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
  },

  /// Copy a package archive and extract it
  Pull {
    /// Package directory or archive
    #[arg(short, long)]
    path: PathBuf,

    /// Destination directory
    #[arg(short, long, default_value = ".")]
    dest: PathBuf,

    /// Only copy the archive
    #[arg(long)]
    no_extract: bool,
  },
}

/// Log to stderr at the console level and, for builds, to `log_file` at the file level.
///
/// The returned guard flushes the file on drop.
fn init_tracing(verbose: bool, levels: &LogSettings, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let default = if verbose { "debug" } else { levels.console_level.as_str() };
  let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  let console = fmt::layer()
    .with_writer(std::io::stderr)
    .without_time()
    .with_filter(console_filter);

  let mut guard = None;
  let file = match log_file {
    Some(path) => {
      let dir = path.parent().unwrap_or(Path::new("."));
      fs::create_dir_all(dir).with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
      let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
      let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .with_context(|| format!("Failed to open build log: {}", path.display()))?;
      let (writer, worker) = tracing_appender::non_blocking(appender);
      guard = Some(worker);
      Some(
        fmt::layer()
          .with_writer(writer)
          .with_ansi(false)
          .with_filter(EnvFilter::new(&levels.file_level)),
      )
    }
    None => None,
  };

  tracing_subscriber::registry().with(console).with(file).init();
  Ok(guard)
}

fn log_settings(settings: &Settings) {
  debug!(
    source_path = %settings.source_path.display(),
    repos = settings.search_repos.len(),
    "loaded settings"
  );
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  let settings = Settings::load(cli.settings.as_deref()).context("Failed to load settings")?;

  match cli.command {
    Commands::Build {
      config,
      dir,
      mode,
      task_name,
      task_id,
      params,
    } => {
      let request = BuildArgs {
        config,
        dir,
        mode,
        task_name,
        task_id,
        params,
      }
      .into_request()?;
      let _guard = init_tracing(cli.verbose, &settings.log, Some(&request.dirs().log_file()))?;
      log_settings(&settings);
      cmd_build(&request, settings)
    }
    Commands::Search {
      maintainer,
      name,
      tag,
      system,
      machine,
      build_type,
      json,
    } => {
      let _guard = init_tracing(cli.verbose, &settings.log, None)?;
      log_settings(&settings);
      let query = SearchQuery {
        system,
        machine,
        build_type,
        ..SearchQuery::new(maintainer, name, tag)
      };
      cmd_search(&query, &settings, json)
    }
    Commands::Pull { path, dest, no_extract } => {
      let _guard = init_tracing(cli.verbose, &settings.log, None)?;
      log_settings(&settings);
      cmd_pull(&path, &dest, !no_extract)
    }
  }
}
