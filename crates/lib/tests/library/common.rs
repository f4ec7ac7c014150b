//! Shared fakes and fixtures for engine tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use hpb_lib::package::{DepItem, DepKey, PackageMeta, SourceInfo};
use hpb_lib::platform::PlatformInfo;
use hpb_lib::repo::{ArtifactFetcher, FetchError, IndexError, PackageIndex, RepoKind, SearchQuery, SearchResult};
use hpb_lib::settings::Settings;
use hpb_lib::source::{SourceError, SourceFetcher};
use hpb_lib::workflow::{BuildRequest, WorkflowEngine};
use tempfile::TempDir;

pub fn host() -> PlatformInfo {
  PlatformInfo {
    system: "linux".to_string(),
    machine: "x86_64".to_string(),
    distr_id: "debian".to_string(),
    distr_ver: "12".to_string(),
    ..Default::default()
  }
}

/// A package as an index would return it.
pub fn package(maintainer: &str, name: &str, tag: &str) -> SearchResult {
  SearchResult {
    repo_kind: RepoKind::Local,
    path: PathBuf::from(format!("/repo/{maintainer}/{name}/{tag}")),
    meta: PackageMeta {
      maintainer: maintainer.to_string(),
      name: name.to_string(),
      tag: tag.to_string(),
      platform: host(),
      ..Default::default()
    },
  }
}

pub fn with_deps(mut result: SearchResult, deps: &[(&str, &str, &str)]) -> SearchResult {
  result.meta.deps = deps.iter().map(|(m, n, t)| DepItem::new(*m, *n, *t)).collect();
  result
}

pub fn fat(mut result: SearchResult) -> SearchResult {
  result.meta.build.fat_pkg = true;
  result
}

/// In-memory index matching on maintainer, name and tag.
pub struct MemoryIndex {
  packages: Vec<SearchResult>,
  pub queries: Arc<Mutex<Vec<String>>>,
}

impl MemoryIndex {
  pub fn new(packages: Vec<SearchResult>) -> Self {
    Self {
      packages,
      queries: Arc::default(),
    }
  }
}

impl PackageIndex for MemoryIndex {
  fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, IndexError> {
    self
      .queries
      .lock()
      .unwrap()
      .push(format!("{}/{}@{}", query.maintainer, query.name, query.tag));
    Ok(
      self
        .packages
        .iter()
        .filter(|r| query.matches(&r.meta))
        .cloned()
        .collect(),
    )
  }
}

/// Fetcher that drops a marker file named after the package into `dest`.
#[derive(Default)]
pub struct MarkerFetcher {
  pub fetched: Arc<Mutex<Vec<DepKey>>>,
}

impl ArtifactFetcher for MarkerFetcher {
  fn fetch(&self, result: &SearchResult, dest: &Path) -> Result<(), FetchError> {
    let marker = dest.join(format!("{}-{}.marker", result.meta.name, result.meta.tag));
    fs::write(&marker, "").map_err(|source| FetchError::Io { path: marker, source })?;
    self.fetched.lock().unwrap().push(result.meta.key());
    Ok(())
  }
}

/// Source fetcher that hands out a fixed directory.
pub struct FixedSource {
  pub path: PathBuf,
  pub requested: Arc<Mutex<Vec<SourceInfo>>>,
}

impl SourceFetcher for FixedSource {
  fn fetch(&self, source: &SourceInfo, _root: &Path) -> Result<PathBuf, SourceError> {
    self.requested.lock().unwrap().push(source.clone());
    Ok(self.path.clone())
  }
}

/// Engine with no configured repositories, for the test host platform.
pub fn engine(temp: &TempDir) -> WorkflowEngine {
  let settings = Settings {
    source_path: temp.path().join("sources"),
    search_repos: Vec::new(),
    ..Default::default()
  };
  WorkflowEngine::new(settings).unwrap().with_platform(host())
}

/// Write `workflow` as `<temp>/project/<file>` and return a request for it.
pub fn project(temp: &TempDir, file: &str, workflow: &str) -> BuildRequest {
  let root = temp.path().join("project");
  fs::create_dir_all(&root).unwrap();
  fs::write(root.join(file), workflow).unwrap();
  BuildRequest::new(root, file)
}
