//! Dependency resolution.
//!
//! Declared dependencies are resolved in three phases:
//!
//! 1. **Searching** - each reference is looked up in the package index. When
//!    several candidates exist they are ranked against the build platform.
//!    The winner's own dependencies are searched recursively unless it is a
//!    fat package.
//! 2. **Coalescing** - resolved packages sharing maintainer, name and major
//!    version are reduced to the highest tag. Tags that are not versions are
//!    reduced to their lexicographic maximum.
//! 3. **Downloading** - each remaining package is fetched and extracted into
//!    the destination directory.
//!
//! Any failure is fatal and nothing is retried.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::package::{DepItem, DepKey};
use crate::platform::PlatformInfo;
use crate::repo::{ArtifactFetcher, FetchError, IndexError, PackageIndex, SearchQuery, SearchResult};
use crate::semver::SemVer;

#[derive(Debug, Error)]
pub enum DepsError {
  #[error("no package found for dependency {0}")]
  Unresolved(DepKey),

  #[error("failed to search for dependency {key}: {source}")]
  Search {
    key: DepKey,
    #[source]
    source: IndexError,
  },

  #[error("failed to download dependency {key}: {source}")]
  Download {
    key: DepKey,
    #[source]
    source: FetchError,
  },
}

impl DepsError {
  /// The dependency that could not be resolved.
  pub fn key(&self) -> &DepKey {
    match self {
      DepsError::Unresolved(key) => key,
      DepsError::Search { key, .. } | DepsError::Download { key, .. } => key,
    }
  }
}

/// Progress of one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Idle,
  Searching,
  Coalescing,
  Downloading,
  Done,
  Failed,
}

/// Packages resolved so far in one build, keyed by `(maintainer, name, tag)`.
#[derive(Debug, Clone, Default)]
pub struct ResolutionState {
  resolved: BTreeMap<DepKey, SearchResult>,
}

impl ResolutionState {
  pub fn contains(&self, key: &DepKey) -> bool {
    self.resolved.contains_key(key)
  }

  pub fn get(&self, key: &DepKey) -> Option<&SearchResult> {
    self.resolved.get(key)
  }

  pub fn insert(&mut self, key: DepKey, result: SearchResult) {
    self.resolved.insert(key, result);
  }

  pub fn keys(&self) -> impl Iterator<Item = &DepKey> {
    self.resolved.keys()
  }

  pub fn len(&self) -> usize {
    self.resolved.len()
  }

  pub fn is_empty(&self) -> bool {
    self.resolved.is_empty()
  }
}

/// Reduce resolved keys to one tag per `(maintainer, name, major)`.
///
/// Tags that are not versions form one group per `(maintainer, name)` and
/// keep the lexicographically greatest tag. On equal precedence the first
/// key seen is kept.
pub fn coalesce<'a>(keys: impl IntoIterator<Item = &'a DepKey>) -> Vec<DepKey> {
  let mut groups: BTreeMap<(String, String, Option<u64>), (&'a DepKey, Option<SemVer>)> = BTreeMap::new();

  for key in keys {
    let version = SemVer::parse(&key.tag).ok();
    let group = (key.maintainer.clone(), key.name.clone(), version.as_ref().map(|v| v.major));

    match groups.get_mut(&group) {
      None => {
        groups.insert(group, (key, version));
      }
      Some(best) => {
        let newer = match (&version, &best.1) {
          (Some(v), Some(b)) => v > b,
          _ => key.tag > best.0.tag,
        };
        if newer {
          *best = (key, version);
        }
      }
    }
  }

  groups.into_values().map(|(key, _)| key.clone()).collect()
}

/// Resolves declared dependencies against a package index.
pub struct DependencyResolver<'a> {
  index: &'a dyn PackageIndex,
  fetcher: &'a dyn ArtifactFetcher,
  platform: &'a PlatformInfo,
  build_type: String,
  state: ResolutionState,
  phase: Phase,
}

impl<'a> DependencyResolver<'a> {
  pub fn new(
    index: &'a dyn PackageIndex,
    fetcher: &'a dyn ArtifactFetcher,
    platform: &'a PlatformInfo,
    build_type: impl Into<String>,
  ) -> Self {
    Self {
      index,
      fetcher,
      platform,
      build_type: build_type.into(),
      state: ResolutionState::default(),
      phase: Phase::Idle,
    }
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn state(&self) -> &ResolutionState {
    &self.state
  }

  /// Search, coalesce and download `deps` into `dest`.
  ///
  /// On success each item's `deps` holds its resolved package's declared
  /// dependencies. Returns the downloaded keys.
  pub fn resolve(&mut self, deps: &mut [DepItem], dest: &Path) -> Result<Vec<DepKey>, DepsError> {
    self.search_all(deps)?;
    let selected = self.coalesce();
    self.download_all(&selected, dest)?;
    Ok(selected)
  }

  /// Resolve every declared dependency and, recursively, their dependencies.
  pub fn search_all(&mut self, deps: &mut [DepItem]) -> Result<(), DepsError> {
    self.phase = Phase::Searching;
    for dep in deps.iter_mut() {
      if let Err(e) = self.search_dep(dep) {
        self.phase = Phase::Failed;
        return Err(e);
      }
    }
    Ok(())
  }

  fn search_dep(&mut self, dep: &mut DepItem) -> Result<(), DepsError> {
    let key = dep.key();
    if let Some(known) = self.state.get(&key) {
      dep.deps = known.meta.deps.clone();
      return Ok(());
    }

    let query = SearchQuery {
      system: self.platform.system.clone(),
      machine: self.platform.machine.clone(),
      ..SearchQuery::new(&dep.maintainer, &dep.name, &dep.tag)
    };
    let candidates = self.index.search(&query).map_err(|source| DepsError::Search {
      key: key.clone(),
      source,
    })?;

    let result = self.select(candidates).ok_or_else(|| {
      warn!(dep = %key, "dependency not found");
      DepsError::Unresolved(key.clone())
    })?;
    debug!(dep = %key, path = %result.path.display(), fat = result.meta.is_fat(), "resolved dependency");

    let fat = result.meta.is_fat();
    dep.deps = result.meta.deps.clone();
    self.state.insert(key, result);

    if fat {
      return Ok(());
    }
    for sub in dep.deps.iter_mut() {
      self.search_dep(sub)?;
    }
    Ok(())
  }

  /// Pick the best candidate. A single candidate is taken as is.
  pub fn select(&self, mut candidates: Vec<SearchResult>) -> Option<SearchResult> {
    if candidates.len() <= 1 {
      return candidates.pop();
    }

    let mut best: Option<(u32, SearchResult)> = None;
    for candidate in candidates {
      let Some(score) = self.score(&candidate) else {
        continue;
      };
      if best.as_ref().is_none_or(|(top, _)| score > *top) {
        best = Some((score, candidate));
      }
    }
    best.map(|(_, result)| result)
  }

  /// Score a candidate against the build platform, or `None` if its system
  /// or machine is set and differs.
  pub fn score(&self, candidate: &SearchResult) -> Option<u32> {
    let meta = &candidate.meta;
    let platform = &meta.platform;

    if !platform.system.is_empty() && platform.system != self.platform.system {
      return None;
    }
    if !platform.machine.is_empty() && platform.machine != self.platform.machine {
      return None;
    }

    let mut score = 0;
    if platform.system == self.platform.system {
      score += 10;
    }
    if platform.machine == self.platform.machine {
      score += 10;
    }
    if platform.distr() == self.platform.distr() {
      score += 2;
    }
    if meta.is_fat() {
      score += 2;
    }

    let build_type = meta.build.build_type.to_lowercase();
    if build_type == self.build_type.to_lowercase() {
      score += 2;
    } else if build_type == "release" {
      score += 1;
    }
    Some(score)
  }

  /// Coalesce the resolved packages into the download set.
  pub fn coalesce(&mut self) -> Vec<DepKey> {
    self.phase = Phase::Coalescing;
    let selected = coalesce(self.state.keys());
    debug!(resolved = self.state.len(), selected = selected.len(), "coalesced dependencies");
    selected
  }

  /// Fetch every selected package into `dest`. Stops at the first failure.
  pub fn download_all(&mut self, selected: &[DepKey], dest: &Path) -> Result<(), DepsError> {
    self.phase = Phase::Downloading;

    for key in selected {
      let Some(result) = self.state.get(key) else {
        self.phase = Phase::Failed;
        return Err(DepsError::Unresolved(key.clone()));
      };

      info!(dep = %key, path = %result.path.display(), "downloading dependency");
      if let Err(source) = self.fetcher.fetch(result, dest) {
        self.phase = Phase::Failed;
        return Err(DepsError::Download {
          key: key.clone(),
          source,
        });
      }
    }

    self.phase = Phase::Done;
    Ok(())
  }
}
