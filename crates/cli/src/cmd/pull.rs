//! Pull command implementation.

use std::path::Path;

use anyhow::{Context, Result};

use hpb_lib::repo::LocalFetcher;

use crate::output::{print_stat, print_success};

/// Copy the package at `path` into `dest`, extracting it unless `extract` is false.
pub fn cmd_pull(path: &Path, dest: &Path, extract: bool) -> Result<()> {
  let archive = LocalFetcher
    .pull(path, dest, extract)
    .with_context(|| format!("Failed to pull {}", path.display()))?;

  if extract {
    print_success(&format!("Extracted into {}", dest.display()));
  } else {
    print_success("Copied package archive");
  }
  print_stat("Archive", &archive.display().to_string());
  Ok(())
}
