//! Copying and extracting package archives.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;
use tracing::{debug, info};

use super::{RepoKind, SearchResult};
use crate::consts::ARCHIVE_SUFFIX;

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("no package archive found in {0}")]
  NoArchive(PathBuf),

  #[error("multiple package archives found in {0}")]
  MultipleArchives(PathBuf),

  #[error("package path does not exist: {0}")]
  NotFound(PathBuf),

  #[error("fetching from {0} repositories is not supported")]
  Unsupported(RepoKind),

  #[error("failed to copy {from} to {to}: {source}")]
  Copy {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to extract {path}: {source}")]
  Extract {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("I/O error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Materializes a located artifact into a destination directory.
pub trait ArtifactFetcher: Send + Sync {
  fn fetch(&self, result: &SearchResult, dest: &Path) -> Result<(), FetchError>;
}

/// Fetcher for artifacts stored on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFetcher;

impl LocalFetcher {
  /// Copy the archive at `path` (or the single archive inside it) into `dest`.
  ///
  /// With `extract`, the copy is unpacked into `dest` and then removed.
  /// Returns the path of the copied archive.
  pub fn pull(&self, path: &Path, dest: &Path, extract: bool) -> Result<PathBuf, FetchError> {
    let archive = find_archive(path)?;
    let file_name = archive.file_name().ok_or_else(|| FetchError::NoArchive(path.to_path_buf()))?;

    fs::create_dir_all(dest).map_err(|source| FetchError::Io {
      path: dest.to_path_buf(),
      source,
    })?;

    let copied = dest.join(file_name);
    info!(from = %archive.display(), to = %dest.display(), "copying package");
    fs::copy(&archive, &copied).map_err(|source| FetchError::Copy {
      from: archive.clone(),
      to: copied.clone(),
      source,
    })?;

    if extract {
      unpack_tar_gz(&copied, dest)?;
      fs::remove_file(&copied).map_err(|source| FetchError::Io {
        path: copied.clone(),
        source,
      })?;
    }

    Ok(copied)
  }
}

impl ArtifactFetcher for LocalFetcher {
  fn fetch(&self, result: &SearchResult, dest: &Path) -> Result<(), FetchError> {
    match result.repo_kind {
      RepoKind::Local => self.pull(&result.path, dest, true).map(|_| ()),
      kind => Err(FetchError::Unsupported(kind)),
    }
  }
}

/// Locate the package archive: `path` itself if it is a file, otherwise the
/// single `*.tar.gz` directly inside it.
pub fn find_archive(path: &Path) -> Result<PathBuf, FetchError> {
  if path.is_file() {
    return Ok(path.to_path_buf());
  }
  if !path.is_dir() {
    return Err(FetchError::NotFound(path.to_path_buf()));
  }

  let entries = fs::read_dir(path).map_err(|source| FetchError::Io {
    path: path.to_path_buf(),
    source,
  })?;

  let mut candidates = Vec::new();
  for entry in entries {
    let entry = entry.map_err(|source| FetchError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    if entry.file_name().to_string_lossy().ends_with(ARCHIVE_SUFFIX) {
      candidates.push(entry.path());
    }
  }

  match candidates.len() {
    0 => Err(FetchError::NoArchive(path.to_path_buf())),
    1 => Ok(candidates.remove(0)),
    _ => Err(FetchError::MultipleArchives(path.to_path_buf())),
  }
}

/// Unpack a gzipped tarball into `dest`, keeping the archive's own layout.
pub fn unpack_tar_gz(archive_path: &Path, dest: &Path) -> Result<(), FetchError> {
  let extract_err = |source| FetchError::Extract {
    path: archive_path.to_path_buf(),
    source,
  };

  let file = File::open(archive_path).map_err(extract_err)?;
  let decoder = GzDecoder::new(BufReader::new(file));
  let mut archive = Archive::new(decoder);
  archive.unpack(dest).map_err(extract_err)?;

  debug!(archive = %archive_path.display(), dest = %dest.display(), "unpacked package");
  Ok(())
}
