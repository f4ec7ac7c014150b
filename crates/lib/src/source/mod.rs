//! Source checkout and git facts.
//!
//! A workflow's `source` section names a git repository and tag. The checkout
//! lives under the configured source root:
//!
//! - depth 1: `<root>/<maintainer>/<name>-<tag>`, a shallow clone of the tag,
//!   reused as is once it exists
//! - depth 0: `<root>/<maintainer>/<name>`, a full clone with the tag checked
//!   out, reused when HEAD already points at the tag
//!
//! Without a source section the working directory is the source.

use std::fs;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use gix::remote::fetch::Shallow;
use thiserror::Error;
use tracing::{debug, info};

use crate::package::SourceInfo;

/// Errors that can occur while preparing sources.
#[derive(Debug, Error)]
pub enum SourceError {
  /// A required `source` field is empty.
  #[error("source field '{0}' is empty")]
  MissingField(&'static str),

  #[error("source with git_depth 1 requires a tag")]
  DepthWithoutTag,

  #[error("unsupported source repo_kind '{0}'")]
  UnsupportedKind(String),

  #[error("failed to create source directory '{0}': {1}")]
  CreateDir(PathBuf, #[source] std::io::Error),

  #[error("failed to remove stale checkout '{0}': {1}")]
  RemoveDir(PathBuf, #[source] std::io::Error),

  #[error("failed to clone repository '{url}': {source}")]
  Clone {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("failed to checkout '{rev}': {source}")]
  Checkout {
    rev: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

/// Resolves a source descriptor to a local checkout.
pub trait SourceFetcher: Send + Sync {
  fn fetch(&self, source: &SourceInfo, root: &Path) -> Result<PathBuf, SourceError>;
}

/// Check that `source` names everything a git checkout needs.
pub fn validate(source: &SourceInfo) -> Result<(), SourceError> {
  if source.repo_kind != "git" {
    return Err(SourceError::UnsupportedKind(source.repo_kind.clone()));
  }
  if source.name.is_empty() {
    return Err(SourceError::MissingField("name"));
  }
  if source.maintainer.is_empty() {
    return Err(SourceError::MissingField("maintainer"));
  }
  if source.repo_url.is_empty() {
    return Err(SourceError::MissingField("repo_url"));
  }
  if source.git_depth == 1 && source.tag.is_empty() {
    return Err(SourceError::DepthWithoutTag);
  }
  Ok(())
}

/// Checkout location of `source` under `root`.
pub fn checkout_path(source: &SourceInfo, root: &Path) -> PathBuf {
  let dir = root.join(&source.maintainer);
  if source.git_depth == 1 {
    dir.join(format!("{}-{}", source.name, source.tag))
  } else {
    dir.join(&source.name)
  }
}

/// Git checkouts through gix.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitSourceFetcher;

impl SourceFetcher for GitSourceFetcher {
  fn fetch(&self, source: &SourceInfo, root: &Path) -> Result<PathBuf, SourceError> {
    validate(source)?;
    let path = checkout_path(source, root);

    if source.git_depth == 1 {
      if path.exists() {
        info!(path = %path.display(), "source already exists, skip download");
        return Ok(path);
      }
    } else if path.exists() {
      if head_matches(&path, &source.tag) {
        debug!(path = %path.display(), tag = %source.tag, "source already at tag");
        return Ok(path);
      }
      info!(path = %path.display(), "removing checkout not at requested tag");
      fs::remove_dir_all(&path).map_err(|e| SourceError::RemoveDir(path.clone(), e))?;
    }

    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(|e| SourceError::CreateDir(parent.to_path_buf(), e))?;
    }

    let depth = NonZeroU32::new(source.git_depth);
    info!(url = %source.repo_url, tag = %source.tag, path = %path.display(), "cloning source");
    clone_repo(&source.repo_url, &source.tag, depth, &path)?;
    Ok(path)
  }
}

/// Whether the repository at `path` has HEAD at `tag`'s commit. An empty tag
/// accepts any existing checkout.
fn head_matches(path: &Path, tag: &str) -> bool {
  let Ok(repo) = gix::open(path) else {
    return false;
  };
  if tag.is_empty() {
    return true;
  }

  let head = repo.head_id().ok().map(|id| id.detach());
  let target = repo
    .rev_parse_single(format!("{tag}^{{commit}}").as_str())
    .ok()
    .map(|id| id.detach());
  head.is_some() && head == target
}

/// Clone `url` into `dest` with `tag` checked out, shallow when `depth` is set.
fn clone_repo(url: &str, tag: &str, depth: Option<NonZeroU32>, dest: &Path) -> Result<gix::Repository, SourceError> {
  let clone_err = |e: Box<dyn std::error::Error + Send + Sync>| SourceError::Clone {
    url: url.to_string(),
    source: e,
  };

  let mut prepared = gix::prepare_clone(url, dest).map_err(|e| clone_err(Box::new(e)))?;
  if !tag.is_empty() {
    prepared = prepared.with_ref_name(Some(tag)).map_err(|e| clone_err(Box::new(e)))?;
  }
  if let Some(depth) = depth {
    prepared = prepared.with_shallow(Shallow::DepthAtRemote(depth));
  }

  let (mut checkout, _outcome) = prepared
    .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| clone_err(Box::new(e)))?;

  let (repo, _outcome) = checkout
    .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| SourceError::Checkout {
      rev: if tag.is_empty() { "HEAD".to_string() } else { tag.to_string() },
      source: Box::new(e),
    })?;

  Ok(repo)
}

/// Git state of a source directory. Fields are empty when unavailable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitInfo {
  /// Tag pointing exactly at HEAD.
  pub tag: String,
  /// Abbreviated HEAD commit id.
  pub commit_id: String,
  pub branch: String,
}

impl GitInfo {
  /// Read git state of the repository containing `path`.
  pub fn discover(path: &Path) -> Self {
    let repo = match gix::discover(path) {
      Ok(repo) => repo,
      Err(e) => {
        debug!(path = %path.display(), error = %e, "not a git repository");
        return Self::default();
      }
    };

    let head = repo.head_id().ok().map(|id| id.detach());
    let commit_id = head.map(|id| id.to_hex_with_len(7).to_string()).unwrap_or_default();
    let branch = repo
      .head_name()
      .ok()
      .flatten()
      .map(|name| name.shorten().to_string())
      .unwrap_or_default();
    let tag = head.and_then(|id| exact_tag(&repo, id)).unwrap_or_default();

    Self { tag, commit_id, branch }
  }

  /// `tag` when on a tag, else `<branch>_<commit>` when there is a commit.
  pub fn git_ref(&self) -> String {
    if !self.tag.is_empty() {
      self.tag.clone()
    } else if !self.commit_id.is_empty() {
      format!("{}_{}", self.branch, self.commit_id)
    } else {
      String::new()
    }
  }
}

/// First tag, by name, whose target peels to `commit`.
fn exact_tag(repo: &gix::Repository, commit: gix::ObjectId) -> Option<String> {
  let references = repo.references().ok()?;
  let mut names: Vec<String> = references
    .tags()
    .ok()?
    .filter_map(Result::ok)
    .filter_map(|mut reference| {
      let id = reference.peel_to_id_in_place().ok()?.detach();
      (id == commit).then(|| reference.name().shorten().to_string())
    })
    .collect();
  names.sort();
  names.into_iter().next()
}
