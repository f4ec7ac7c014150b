//! Version tag parsing and ordering.
//!
//! Tags look like `v1.2.3`, `1.2`, `2` or `1.0.0-rc.1`. A leading `v` is
//! optional, one to three numeric components are accepted (missing ones are
//! zero), and everything after the first `-` is the pre-release.
//!
//! Pre-releases rank below the release they precede and are ordered by the
//! table `alpha < beta < rc`, with unrecognized labels below `alpha`. Equal
//! labels are ordered by the second dot-separated component (`beta` is
//! `beta.0`, `rc.1.2` is `rc.1`).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemverError {
  #[error("invalid version tag '{0}'")]
  Invalid(String),
}

/// A parsed version tag.
#[derive(Debug, Clone)]
pub struct SemVer {
  pub major: u64,
  pub minor: u64,
  pub patch: u64,
  /// Pre-release label without the leading `-`, empty for releases.
  pub pre_release: String,
}

impl SemVer {
  /// Parse a version tag.
  pub fn parse(tag: &str) -> Result<Self, SemverError> {
    let invalid = || SemverError::Invalid(tag.to_string());

    let trimmed = tag.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let (version, pre_release) = trimmed.split_once('-').unwrap_or((trimmed, ""));

    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() > 3 {
      return Err(invalid());
    }

    let mut numbers = [0u64; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
      if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
      }
      *slot = part.parse().map_err(|_| invalid())?;
    }

    Ok(Self {
      major: numbers[0],
      minor: numbers[1],
      patch: numbers[2],
      pre_release: pre_release.to_string(),
    })
  }

  pub fn is_pre_release(&self) -> bool {
    !self.pre_release.is_empty()
  }

  /// Split the pre-release into its precedence rank and numeric suffix.
  fn pre_release_key(&self) -> (i8, u64) {
    let mut parts = self.pre_release.split('.');
    let label = parts.next().unwrap_or_default();
    let suffix = parts.next().unwrap_or("0");
    let rank = match label {
      "alpha" => 0,
      "beta" => 1,
      "rc" => 2,
      _ => -1,
    };
    // Non-numeric suffixes count as zero
    let number = suffix.parse().unwrap_or(0);
    (rank, number)
  }

  fn cmp_pre_release(&self, other: &Self) -> Ordering {
    match (self.is_pre_release(), other.is_pre_release()) {
      (false, false) => Ordering::Equal,
      (false, true) => Ordering::Greater,
      (true, false) => Ordering::Less,
      (true, true) => self.pre_release_key().cmp(&other.pre_release_key()),
    }
  }
}

impl Ord for SemVer {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .major
      .cmp(&other.major)
      .then(self.minor.cmp(&other.minor))
      .then(self.patch.cmp(&other.patch))
      .then_with(|| self.cmp_pre_release(other))
  }
}

impl PartialOrd for SemVer {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

// Equality is precedence equality: `1.0` == `1.0.0`, `beta` == `beta.0`.
impl PartialEq for SemVer {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for SemVer {}

impl FromStr for SemVer {
  type Err = SemverError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl fmt::Display for SemVer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
    if self.is_pre_release() {
      write!(f, "-{}", self.pre_release)?;
    }
    Ok(())
  }
}

/// Compare two tags, or `None` if either does not parse.
pub fn compare(a: &str, b: &str) -> Option<Ordering> {
  Some(SemVer::parse(a).ok()?.cmp(&SemVer::parse(b).ok()?))
}
