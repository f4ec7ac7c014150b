//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated test environment.
///
/// Each test gets its own project, configuration and data directories.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("project")).unwrap();
    Self { temp }
  }

  /// Create an environment with `content` as `project/<name>`.
  pub fn with_workflow(name: &str, content: &str) -> Self {
    let env = Self::new();
    env.write_file(&format!("project/{name}"), content);
    env
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  fn dir(&self, name: &str) -> PathBuf {
    let p = self.temp.path().join(name);
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Project root passed as the build's working directory.
  pub fn project_path(&self) -> PathBuf {
    self.dir("project")
  }

  /// Data path; the default local package repository lives under `hpb/packages`.
  pub fn data_path(&self) -> PathBuf {
    self.dir("data")
  }

  pub fn packages_path(&self) -> PathBuf {
    self.data_path().join("hpb").join("packages")
  }

  pub fn config_path(&self) -> PathBuf {
    self.dir("config")
  }

  /// Read a file below the project root.
  pub fn read_project_file(&self, relative: impl AsRef<Path>) -> String {
    std::fs::read_to_string(self.project_path().join(relative)).unwrap()
  }

  /// Get a pre-configured Command for the hpb binary.
  ///
  /// Sets environment variables for isolated testing:
  /// - `XDG_CONFIG_HOME`: no user settings file
  /// - `XDG_DATA_HOME`: isolated package and source directories
  /// - `APPDATA`: same, for Windows
  pub fn hpb_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("hpb");
    cmd.env("XDG_CONFIG_HOME", self.config_path());
    cmd.env("XDG_DATA_HOME", self.data_path());
    cmd.env("APPDATA", self.data_path());
    cmd.env_remove("RUST_LOG");
    cmd
  }

  /// `hpb build -c <workflow> -d <project>`.
  pub fn build_cmd(&self, workflow: &str) -> Command {
    let mut cmd = self.hpb_cmd();
    cmd.arg("build").arg("-c").arg(workflow).arg("-d").arg(self.project_path());
    cmd
  }
}
