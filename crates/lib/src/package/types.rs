use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::platform::PlatformInfo;
use crate::semver::SemVer;

/// Identity of a package version: `(maintainer, name, tag)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepKey {
  pub maintainer: String,
  pub name: String,
  pub tag: String,
}

impl DepKey {
  pub fn new(maintainer: impl Into<String>, name: impl Into<String>, tag: impl Into<String>) -> Self {
    Self {
      maintainer: maintainer.into(),
      name: name.into(),
      tag: tag.into(),
    }
  }
}

impl fmt::Display for DepKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}@{}", self.maintainer, self.name, self.tag)
  }
}

/// A reference to a dependency package.
///
/// `deps` is empty when declared and is filled in by resolution with the
/// resolved package's own declared dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepItem {
  pub maintainer: String,
  pub name: String,
  pub tag: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub deps: Vec<DepItem>,
}

impl DepItem {
  pub fn new(maintainer: impl Into<String>, name: impl Into<String>, tag: impl Into<String>) -> Self {
    Self {
      maintainer: maintainer.into(),
      name: name.into(),
      tag: tag.into(),
      deps: Vec::new(),
    }
  }

  pub fn key(&self) -> DepKey {
    DepKey::new(&self.maintainer, &self.name, &self.tag)
  }
}

impl fmt::Display for DepItem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.key().fmt(f)
  }
}

/// Compiler identity recorded with a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerInfo {
  pub cc: String,
  pub cc_ver: String,
  pub cxx: String,
  pub cxx_ver: String,
}

/// C library identity recorded with a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkInfo {
  pub libc: String,
  pub libc_ver: String,
}

/// How an artifact was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildInfo {
  pub build_type: String,
  /// Self-contained package: its declared dependencies are bundled.
  pub fat_pkg: bool,
  #[serde(flatten)]
  pub compiler: CompilerInfo,
  #[serde(flatten)]
  pub link: LinkInfo,
}

impl Default for BuildInfo {
  fn default() -> Self {
    Self {
      build_type: "release".to_string(),
      fat_pkg: false,
      compiler: CompilerInfo::default(),
      link: LinkInfo::default(),
    }
  }
}

/// Where a package's source comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceInfo {
  pub maintainer: String,
  pub name: String,
  pub tag: String,
  pub repo_kind: String,
  pub repo_url: String,
  /// 0 = full clone then checkout, 1 = shallow clone pinned to `tag`.
  pub git_depth: u32,
}

impl Default for SourceInfo {
  fn default() -> Self {
    Self {
      maintainer: String::new(),
      name: String::new(),
      tag: String::new(),
      repo_kind: String::new(),
      repo_url: String::new(),
      git_depth: 1,
    }
  }
}

impl SourceInfo {
  /// Whether the source must be fetched rather than taken from the working directory.
  pub fn is_remote(&self) -> bool {
    !self.repo_kind.is_empty() && !self.repo_url.is_empty()
  }
}

/// Immutable description of a built artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageMeta {
  pub name: String,
  pub maintainer: String,
  pub tag: String,
  pub platform: PlatformInfo,
  pub build: BuildInfo,
  pub deps: Vec<DepItem>,
}

impl PackageMeta {
  pub fn key(&self) -> DepKey {
    DepKey::new(&self.maintainer, &self.name, &self.tag)
  }

  pub fn is_fat(&self) -> bool {
    self.build.fat_pkg
  }

  /// Directory name of one build variant: `<build_type>-<system>-<distr>-<machine>`.
  pub fn pkg_dir_name(&self) -> String {
    format!(
      "{}-{}-{}-{}",
      self.build.build_type,
      self.platform.system,
      self.platform.distr(),
      self.platform.machine
    )
  }

  /// Path of this package relative to a repository root.
  ///
  /// Non-version tags of the form `<branch>_<commit>` are split into two levels.
  pub fn pkg_relpath(&self) -> PathBuf {
    let mut path = PathBuf::from(&self.maintainer).join(&self.name);

    match self.tag.split_once('_') {
      Some((branch, commit)) if SemVer::parse(&self.tag).is_err() && !commit.contains('_') => {
        path.push(branch);
        path.push(commit);
      }
      _ => path.push(&self.tag),
    }

    path.join(self.pkg_dir_name())
  }

  /// Archive file name without suffix: `name[-tag][-build_type][-system][-machine]`.
  pub fn pkg_file_stem(&self) -> String {
    let mut stem = self.name.clone();
    for part in [
      &self.tag,
      &self.build.build_type,
      &self.platform.system,
      &self.platform.machine,
    ] {
      if !part.is_empty() {
        stem.push('-');
        stem.push_str(part);
      }
    }
    stem
  }

  /// One-line description for listings.
  pub fn desc(&self) -> String {
    let mut parts = vec![
      format!("system={}", self.platform.system),
      format!("machine={}", self.platform.machine),
    ];

    if self.platform.system == "linux" {
      parts.push(format!("dist={}", self.platform.distr()));
    }
    parts.push(format!("build_type={}", self.build.build_type));
    parts.push(format!("fat_pkg={}", self.build.fat_pkg));

    if self.platform.system != "windows" {
      let joined = |a: &str, b: &str| if b.is_empty() { a.to_string() } else { format!("{a}-{b}") };
      parts.push(format!("cc={}", joined(&self.build.compiler.cc, &self.build.compiler.cc_ver)));
      parts.push(format!("cxx={}", joined(&self.build.compiler.cxx, &self.build.compiler.cxx_ver)));
      parts.push(format!("libc={}", joined(&self.build.link.libc, &self.build.link.libc_ver)));
    }

    parts.join(", ")
  }
}
