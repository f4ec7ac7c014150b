//! Reading and writing package metadata files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::PackageMeta;
use crate::consts::{ARCHIVE_SUFFIX, META_FILENAME, PKG_POINTER_FILENAME};

#[derive(Debug, Error)]
pub enum MetaError {
  #[error("failed to read metadata file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to write metadata file {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid metadata in {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("failed to serialize metadata: {0}")]
  Serialize(#[from] serde_yaml::Error),
}

/// Directories handed to the packaging stage, written as `pkg.yml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkgPointer {
  pub meta_file: PathBuf,
  pub output_dir: PathBuf,
  pub pkg_dir: PathBuf,
  pub deps_dir: PathBuf,
  /// Archive to pack into, under `pkg_dir`.
  pub pkg_file: PathBuf,
  /// Where the package belongs, relative to a repository root.
  pub repo_path: PathBuf,
}

impl PkgPointer {
  /// Pointer for `meta` with its archive under `pkg_dir`.
  pub fn new(meta: &PackageMeta, meta_file: PathBuf, output_dir: PathBuf, pkg_dir: PathBuf, deps_dir: PathBuf) -> Self {
    Self {
      pkg_file: pkg_dir.join(format!("{}{ARCHIVE_SUFFIX}", meta.pkg_file_stem())),
      repo_path: meta.pkg_relpath(),
      meta_file,
      output_dir,
      pkg_dir,
      deps_dir,
    }
  }
}

/// Read a package metadata file.
pub fn read_meta(path: &Path) -> Result<PackageMeta, MetaError> {
  let content = fs::read_to_string(path).map_err(|source| MetaError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  serde_yaml::from_str(&content).map_err(|source| MetaError::Parse {
    path: path.to_path_buf(),
    source,
  })
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), MetaError> {
  let content = serde_yaml::to_string(value)?;
  fs::write(path, content).map_err(|source| MetaError::Write {
    path: path.to_path_buf(),
    source,
  })
}

/// Sink for the metadata produced by a build.
///
/// Called once per build, after preparation and before any job runs.
pub trait MetadataWriter: Send + Sync {
  /// Persist `meta` and the packaging pointer. Returns the metadata file path.
  fn write(&self, build_dir: &Path, meta: &PackageMeta, pointer: &PkgPointer) -> Result<PathBuf, MetaError>;
}

/// Writes `hpb.yml` and `pkg.yml` into the build directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlMetadataWriter;

impl MetadataWriter for YamlMetadataWriter {
  fn write(&self, build_dir: &Path, meta: &PackageMeta, pointer: &PkgPointer) -> Result<PathBuf, MetaError> {
    let meta_path = build_dir.join(META_FILENAME);
    write_yaml(&meta_path, meta)?;

    let pointer_path = build_dir.join(PKG_POINTER_FILENAME);
    write_yaml(&pointer_path, pointer)?;

    debug!(meta = %meta_path.display(), pointer = %pointer_path.display(), "wrote package metadata");
    Ok(meta_path)
  }
}
