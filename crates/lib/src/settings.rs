//! User and system settings.
//!
//! Settings are an explicit value handed to the workflow engine. They are
//! loaded once by the caller, from an explicit file or from the first
//! `settings.yml` found in the user or system configuration directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::SETTINGS_FILENAME;
use crate::platform::paths::{config_dir, data_dir, expand_tilde, system_config_dir};

#[derive(Debug, Error)]
pub enum SettingsError {
  #[error("settings file not found: {0}")]
  NotFound(PathBuf),

  #[error("failed to read settings file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid settings in {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },
}

/// Log levels for the console and the log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
  pub console_level: String,
  pub file_level: String,
}

impl Default for LogSettings {
  fn default() -> Self {
    Self {
      console_level: "info".to_string(),
      file_level: "debug".to_string(),
    }
  }
}

/// Kind of package repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoKind {
  Local,
  Remote,
}

impl std::fmt::Display for RepoKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RepoKind::Local => f.write_str("local"),
      RepoKind::Remote => f.write_str("remote"),
    }
  }
}

/// One package repository consulted during dependency search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
  pub kind: RepoKind,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub path: Option<PathBuf>,
  #[serde(default)]
  pub url: Option<String>,
}

impl RepoConfig {
  pub fn local(path: impl Into<PathBuf>) -> Self {
    Self {
      kind: RepoKind::Local,
      name: "local".to_string(),
      path: Some(path.into()),
      url: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub log: LogSettings,
  /// Root directory for source checkouts.
  pub source_path: PathBuf,
  /// Package repositories, searched in order.
  pub search_repos: Vec<RepoConfig>,
  /// Shell used to run step commands, e.g. `bash -c`. Platform default when unset.
  pub shell: Option<String>,
}

impl Default for Settings {
  fn default() -> Self {
    let data = data_dir();
    Self {
      log: LogSettings::default(),
      source_path: data.join("sources"),
      search_repos: vec![RepoConfig::local(data.join("packages"))],
      shell: None,
    }
  }
}

impl Settings {
  /// Load settings.
  ///
  /// An explicit `path` must exist. Without one, the user then the system
  /// configuration directory is searched, falling back to defaults.
  pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
    let found = match path {
      Some(p) => {
        if !p.exists() {
          return Err(SettingsError::NotFound(p.to_path_buf()));
        }
        Some(p.to_path_buf())
      }
      None => Self::search_paths().into_iter().find(|p| p.is_file()),
    };

    match found {
      Some(p) => Self::from_file(&p),
      None => {
        debug!("no settings file found, using defaults");
        Ok(Self::default())
      }
    }
  }

  /// Candidate settings files, most specific first.
  pub fn search_paths() -> Vec<PathBuf> {
    vec![
      config_dir().join(SETTINGS_FILENAME),
      system_config_dir().join(SETTINGS_FILENAME),
    ]
  }

  /// Read and parse one settings file.
  pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
    let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let mut settings: Settings = serde_yaml::from_str(&content).map_err(|source| SettingsError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    settings.expand_paths();
    debug!(path = %path.display(), "loaded settings");
    Ok(settings)
  }

  fn expand_paths(&mut self) {
    self.source_path = expand_tilde(&self.source_path);
    for repo in &mut self.search_repos {
      if let Some(p) = &repo.path {
        repo.path = Some(expand_tilde(p));
      }
    }
  }
}
