//! Search command implementation.

use anyhow::{Context, Result};

use hpb_lib::repo::{PackageIndex, RepoIndex, SearchQuery};
use hpb_lib::settings::Settings;

use crate::output::{print_info, print_json, print_stat, print_success, symbols};

pub fn cmd_search(query: &SearchQuery, settings: &Settings, json: bool) -> Result<()> {
  let index = RepoIndex::from_settings(settings).context("Invalid repository configuration")?;
  let results = index.search(query).context("Search failed")?;

  if json {
    return print_json(&results);
  }

  if results.is_empty() {
    print_info(&format!("No packages found for {}/{}", query.maintainer, query.name));
    return Ok(());
  }

  for result in &results {
    println!("{} {}", symbols::INFO, result.meta.key());
    print_stat("Variant", &result.meta.desc());
    print_stat("Repo", &result.repo_kind.to_string());
    print_stat("Path", &result.path.display().to_string());
  }

  println!();
  print_success(&format!("{} package(s) found", results.len()));
  Ok(())
}
