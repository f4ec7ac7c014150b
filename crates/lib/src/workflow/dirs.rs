//! Directory layout of one build.
//!
//! ```text
//! dev:   <root>/build                      build_dir
//!        <root>/build/_hpb                 task_dir, hpb_dir
//! task:  <root>/_hpb/<task_name>.<task_id> task_dir, hpb_dir
//!        <task_dir>/build                  build_dir
//! both:  <hpb_dir>/{pkg,deps,test_deps,output}
//!        <task_dir>/log
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use crate::consts::BUILD_LOG_FILENAME;
use crate::vars::VarStore;

/// Name of the per-build bookkeeping directory.
pub const HPB_DIR_NAME: &str = "_hpb";

/// Where a build places its working directories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuildMode {
  /// In-tree build for local development.
  #[default]
  Dev,
  /// Isolated build under a per-task directory.
  Task,
}

impl fmt::Display for BuildMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildMode::Dev => f.write_str("dev"),
      BuildMode::Task => f.write_str("task"),
    }
  }
}

impl FromStr for BuildMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "dev" => Ok(BuildMode::Dev),
      "task" => Ok(BuildMode::Task),
      other => Err(format!("unknown build mode '{other}'")),
    }
  }
}

/// Resolved directories of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDirs {
  pub root: PathBuf,
  pub task: PathBuf,
  pub build: PathBuf,
  pub hpb: PathBuf,
  pub pkg: PathBuf,
  pub deps: PathBuf,
  pub test_deps: PathBuf,
  pub output: PathBuf,
  /// Build log directory. Kept across builds.
  pub log: PathBuf,
}

impl BuildDirs {
  pub fn new(root: &Path, mode: BuildMode, task_name: &str, task_id: &str) -> Self {
    let (task, build) = match mode {
      BuildMode::Dev => {
        let build = root.join("build");
        (build.join(HPB_DIR_NAME), build)
      }
      BuildMode::Task => {
        let task = root.join(HPB_DIR_NAME).join(format!("{task_name}.{task_id}"));
        let build = task.join("build");
        (task, build)
      }
    };
    let hpb = task.clone();

    Self {
      root: root.to_path_buf(),
      pkg: hpb.join("pkg"),
      deps: hpb.join("deps"),
      test_deps: hpb.join("test_deps"),
      output: hpb.join("output"),
      log: task.join("log"),
      task,
      build,
      hpb,
    }
  }

  /// Create the layout. Package, dependency and output directories start empty.
  pub fn prepare(&self) -> std::io::Result<()> {
    fs::create_dir_all(&self.task)?;
    fs::create_dir_all(&self.build)?;

    for dir in [&self.pkg, &self.deps, &self.test_deps, &self.output] {
      if dir.exists() {
        debug!(path = %dir.display(), "clearing directory");
        fs::remove_dir_all(dir)?;
      }
      fs::create_dir_all(dir)?;
    }
    Ok(())
  }

  /// The per-build log file.
  pub fn log_file(&self) -> PathBuf {
    self.log.join(BUILD_LOG_FILENAME)
  }

  /// Expose every directory as an inner variable.
  pub fn export(&self, vars: &mut VarStore) {
    for (name, dir) in [
      ("ROOT_DIR", &self.root),
      ("TASK_DIR", &self.task),
      ("BUILD_DIR", &self.build),
      ("PKG_DIR", &self.pkg),
      ("DEPS_DIR", &self.deps),
      ("TEST_DEPS_DIR", &self.test_deps),
      ("OUTPUT_DIR", &self.output),
    ] {
      vars.set_inner(name, dir.display().to_string());
    }
  }
}
