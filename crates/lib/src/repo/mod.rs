//! Package repositories.
//!
//! - [`local`] - index over a package directory tree on disk
//! - [`fetch`] - copying and extracting a located artifact
//!
//! Every query field follows "ignore if empty" semantics: an empty value on
//! either the query or the metadata side matches anything.

pub mod fetch;
pub mod local;

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::package::PackageMeta;
use crate::settings::{RepoConfig, Settings};

pub use crate::settings::RepoKind;
pub use fetch::{ArtifactFetcher, FetchError, LocalFetcher};
pub use local::LocalIndex;

#[derive(Debug, Error)]
pub enum IndexError {
  #[error("package repository '{0}' has no path")]
  MissingPath(String),

  #[error("failed to scan package repository {path}: {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },
}

/// Filters for a package search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
  pub maintainer: String,
  pub name: String,
  pub tag: String,
  pub system: String,
  pub machine: String,
  pub distr: String,
  pub build_type: String,
}

fn field_matches(query: &str, meta: &str) -> bool {
  query.is_empty() || meta.is_empty() || query == meta
}

impl SearchQuery {
  pub fn new(maintainer: impl Into<String>, name: impl Into<String>, tag: impl Into<String>) -> Self {
    Self {
      maintainer: maintainer.into(),
      name: name.into(),
      tag: tag.into(),
      ..Default::default()
    }
  }

  /// Whether `meta` satisfies every non-empty filter.
  pub fn matches(&self, meta: &PackageMeta) -> bool {
    field_matches(&self.maintainer, &meta.maintainer)
      && field_matches(&self.name, &meta.name)
      && field_matches(&self.tag, &meta.tag)
      && field_matches(&self.system.to_lowercase(), &meta.platform.system.to_lowercase())
      && field_matches(&self.machine, &meta.platform.machine)
      && field_matches(
        &self.build_type.to_lowercase(),
        &meta.build.build_type.to_lowercase(),
      )
      && self.distr_matches(meta)
  }

  /// `distr` is `<id>[-<ver>]`; the version is only compared when both sides have one.
  fn distr_matches(&self, meta: &PackageMeta) -> bool {
    if self.distr.is_empty() || meta.platform.distr_id.is_empty() {
      return true;
    }
    let (id, ver) = self.distr.split_once('-').unwrap_or((&self.distr, ""));
    id == meta.platform.distr_id && field_matches(ver, &meta.platform.distr_ver)
  }
}

/// A located candidate artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
  pub repo_kind: RepoKind,
  /// Directory holding the artifact and its metadata file.
  pub path: PathBuf,
  pub meta: PackageMeta,
}

/// Queryable catalog of built packages.
pub trait PackageIndex: Send + Sync {
  fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, IndexError>;
}

/// Stand-in for remote repositories, which are not supported yet.
#[derive(Debug, Clone)]
pub struct RemoteIndex {
  pub url: String,
}

impl PackageIndex for RemoteIndex {
  fn search(&self, _query: &SearchQuery) -> Result<Vec<SearchResult>, IndexError> {
    warn!(url = %self.url, "remote package repositories are not supported, skipping");
    Ok(Vec::new())
  }
}

/// Chains the configured repositories, concatenating results in order.
#[derive(Default)]
pub struct RepoIndex {
  repos: Vec<Box<dyn PackageIndex>>,
}

impl RepoIndex {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_settings(settings: &Settings) -> Result<Self, IndexError> {
    let mut index = Self::new();
    for repo in &settings.search_repos {
      index.push(Self::open(repo)?);
    }
    Ok(index)
  }

  fn open(repo: &RepoConfig) -> Result<Box<dyn PackageIndex>, IndexError> {
    Ok(match repo.kind {
      RepoKind::Local => {
        let path = repo.path.clone().ok_or_else(|| IndexError::MissingPath(repo.name.clone()))?;
        Box::new(LocalIndex::new(path))
      }
      RepoKind::Remote => Box::new(RemoteIndex {
        url: repo.url.clone().unwrap_or_default(),
      }),
    })
  }

  pub fn push(&mut self, index: Box<dyn PackageIndex>) {
    self.repos.push(index);
  }

  pub fn len(&self) -> usize {
    self.repos.len()
  }

  pub fn is_empty(&self) -> bool {
    self.repos.is_empty()
  }
}

impl PackageIndex for RepoIndex {
  fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, IndexError> {
    let mut results = Vec::new();
    for repo in &self.repos {
      results.extend(repo.search(query)?);
    }
    Ok(results)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::platform::PlatformInfo;

  fn meta(system: &str, machine: &str, build_type: &str) -> PackageMeta {
    let mut meta = PackageMeta {
      maintainer: "google".to_string(),
      name: "googletest".to_string(),
      tag: "v1.13.0".to_string(),
      platform: PlatformInfo {
        system: system.to_string(),
        machine: machine.to_string(),
        distr_id: "ubuntu".to_string(),
        distr_ver: "22.04".to_string(),
        ..Default::default()
      },
      ..Default::default()
    };
    meta.build.build_type = build_type.to_string();
    meta
  }

  #[test]
  fn empty_query_matches_everything() {
    assert!(SearchQuery::default().matches(&meta("linux", "x86_64", "release")));
  }

  #[test]
  fn empty_metadata_field_is_ignored() {
    let mut query = SearchQuery::new("google", "googletest", "v1.13.0");
    query.system = "linux".to_string();
    query.machine = "aarch64".to_string();
    assert!(query.matches(&meta("", "", "release")));
    assert!(!query.matches(&meta("linux", "x86_64", "release")));
  }

  #[test]
  fn tag_and_name_must_match_when_given() {
    assert!(!SearchQuery::new("google", "googletest", "v1.12.0").matches(&meta("linux", "x86_64", "")));
    assert!(!SearchQuery::new("google", "leveldb", "").matches(&meta("linux", "x86_64", "")));
  }

  #[test]
  fn build_type_is_case_insensitive() {
    let mut query = SearchQuery::default();
    query.build_type = "Debug".to_string();
    assert!(query.matches(&meta("linux", "x86_64", "debug")));
    assert!(!query.matches(&meta("linux", "x86_64", "release")));
  }

  #[test]
  fn distr_version_optional() {
    let mut query = SearchQuery::default();
    query.distr = "ubuntu".to_string();
    assert!(query.matches(&meta("linux", "x86_64", "")));
    query.distr = "ubuntu-20.04".to_string();
    assert!(!query.matches(&meta("linux", "x86_64", "")));
    query.distr = "alpine".to_string();
    assert!(!query.matches(&meta("linux", "x86_64", "")));
  }

  struct Fixed(Vec<SearchResult>);

  impl PackageIndex for Fixed {
    fn search(&self, _query: &SearchQuery) -> Result<Vec<SearchResult>, IndexError> {
      Ok(self.0.clone())
    }
  }

  #[test]
  fn chain_concatenates_in_order() {
    let first = SearchResult {
      repo_kind: RepoKind::Local,
      path: PathBuf::from("/a"),
      meta: meta("linux", "x86_64", "release"),
    };
    let second = SearchResult {
      path: PathBuf::from("/b"),
      ..first.clone()
    };

    let mut index = RepoIndex::new();
    index.push(Box::new(Fixed(vec![first.clone()])));
    index.push(Box::new(RemoteIndex {
      url: "https://example.com".to_string(),
    }));
    index.push(Box::new(Fixed(vec![second.clone()])));

    assert_eq!(index.len(), 3);
    assert_eq!(index.search(&SearchQuery::default()).unwrap(), vec![first, second]);
  }

  #[test]
  fn local_repo_without_path_is_error() {
    let settings = Settings {
      search_repos: vec![RepoConfig {
        kind: RepoKind::Local,
        name: "broken".to_string(),
        path: None,
        url: None,
      }],
      ..Default::default()
    };
    assert!(matches!(RepoIndex::from_settings(&settings), Err(IndexError::MissingPath(_))));
  }
}
