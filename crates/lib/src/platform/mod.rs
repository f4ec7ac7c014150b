//! Platform facts for the machine running a build.
//!
//! [`PlatformInfo`] is both the descriptor written into package metadata and
//! the filter used when searching package repositories.

pub mod os;
pub mod paths;

use serde::{Deserialize, Serialize};

pub use os::{Os, system_name};

/// Platform descriptor of a build host or a packaged artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformInfo {
  /// Lowercase system name (`linux`, `darwin`, `windows`).
  pub system: String,
  /// Kernel release.
  pub release: String,
  /// Kernel version string.
  pub version: String,
  /// CPU architecture (`x86_64`, `aarch64`).
  pub machine: String,
  /// Distribution id on Linux (`ubuntu`, `arch`, `alpine`).
  pub distr_id: String,
  /// Distribution version on Linux (`22.04`).
  pub distr_ver: String,
}

impl PlatformInfo {
  /// Detect the current platform.
  pub fn detect() -> Self {
    let (release, version) = kernel_release();
    let system = system_name();

    let (distr_id, distr_ver) = if system == Os::Linux.as_str() {
      read_os_release()
    } else {
      (String::new(), String::new())
    };

    Self {
      system,
      release,
      version,
      machine: std::env::consts::ARCH.to_string(),
      distr_id,
      distr_ver,
    }
  }

  /// Distribution string: `<id>-<ver>` on Linux, the kernel version elsewhere.
  pub fn distr(&self) -> String {
    if self.system == Os::Linux.as_str() {
      if self.distr_ver.is_empty() {
        self.distr_id.clone()
      } else {
        format!("{}-{}", self.distr_id, self.distr_ver)
      }
    } else {
      self.version.clone()
    }
  }
}

/// C library flavor the binary was built against.
pub fn libc_name() -> &'static str {
  if cfg!(target_env = "musl") {
    "musl"
  } else if cfg!(target_env = "gnu") {
    "glibc"
  } else if cfg!(target_env = "msvc") {
    "msvcrt"
  } else {
    ""
  }
}

#[cfg(unix)]
fn kernel_release() -> (String, String) {
  let uname = rustix::system::uname();
  (
    uname.release().to_string_lossy().into_owned(),
    uname.version().to_string_lossy().into_owned(),
  )
}

#[cfg(not(unix))]
fn kernel_release() -> (String, String) {
  (String::new(), String::new())
}

fn read_os_release() -> (String, String) {
  ["/etc/os-release", "/usr/lib/os-release"]
    .iter()
    .find_map(|p| std::fs::read_to_string(p).ok())
    .map(|content| parse_os_release(&content))
    .unwrap_or_default()
}

/// Extract `ID` and `VERSION_ID` from os-release content.
pub fn parse_os_release(content: &str) -> (String, String) {
  let mut id = String::new();
  let mut version_id = String::new();

  for line in content.lines() {
    let Some((key, value)) = line.trim().split_once('=') else {
      continue;
    };
    let value = value.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
    match key {
      "ID" => id = value,
      "VERSION_ID" => version_id = value,
      _ => {}
    }
  }

  (id, version_id)
}
