//! Package index over a local directory tree.
//!
//! Packages live under `<root>/<maintainer>/<name>/<tag>/<variant>/`, each
//! variant directory holding an `hpb.yml` metadata file next to its archive.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{IndexError, PackageIndex, RepoKind, SearchQuery, SearchResult};
use crate::consts::META_FILENAME;
use crate::package::read_meta;

/// Index backed by a local package directory.
#[derive(Debug, Clone)]
pub struct LocalIndex {
  root: PathBuf,
}

impl LocalIndex {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Narrow the walk to the maintainer/name subtree when both are known.
  fn scan_root(&self, query: &SearchQuery) -> PathBuf {
    let mut root = self.root.clone();
    if !query.maintainer.is_empty() {
      root.push(&query.maintainer);
      if !query.name.is_empty() {
        root.push(&query.name);
      }
    }
    root
  }
}

impl PackageIndex for LocalIndex {
  fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, IndexError> {
    let scan_root = self.scan_root(query);
    if !scan_root.is_dir() {
      debug!(path = %scan_root.display(), "package directory does not exist");
      return Ok(Vec::new());
    }

    let mut results = Vec::new();
    for entry in WalkDir::new(&scan_root).sort_by_file_name() {
      let entry = entry.map_err(|source| IndexError::Walk {
        path: scan_root.clone(),
        source,
      })?;
      if !entry.file_type().is_file() || entry.file_name() != META_FILENAME {
        continue;
      }

      let meta = match read_meta(entry.path()) {
        Ok(meta) => meta,
        Err(e) => {
          warn!(error = %e, "skipping unreadable package metadata");
          continue;
        }
      };

      if query.matches(&meta) {
        let dir = entry.path().parent().unwrap_or(&scan_root).to_path_buf();
        results.push(SearchResult {
          repo_kind: RepoKind::Local,
          path: dir,
          meta,
        });
      }
    }

    debug!(root = %self.root.display(), found = results.len(), "searched local repository");
    Ok(results)
  }
}
