//! Reading workflow documents from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::types::Workflow;

#[derive(Debug, Error)]
pub enum LoadError {
  #[error("failed to read workflow '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed workflow '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },
}

/// Load and parse the workflow at `path`.
pub fn load_workflow(path: &Path) -> Result<Workflow, LoadError> {
  let content = fs::read_to_string(path).map_err(|source| LoadError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  let workflow = parse_workflow(&content).map_err(|source| LoadError::Parse {
    path: path.to_path_buf(),
    source,
  })?;
  debug!(path = %path.display(), jobs = workflow.jobs.len(), "loaded workflow");
  Ok(workflow)
}

/// Parse a workflow document. An empty document is an empty workflow.
pub fn parse_workflow(content: &str) -> Result<Workflow, serde_yaml::Error> {
  if content.trim().is_empty() {
    return Ok(Workflow::default());
  }
  serde_yaml::from_str(content)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn loads_a_document() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("zlib.yml");
    fs::write(
      &path,
      "jobs:\n  build:\n    steps:\n      - run: echo hello\n",
    )
    .unwrap();

    let workflow = load_workflow(&path).unwrap();
    assert_eq!(workflow.jobs.get("build").unwrap().steps[0].run, "echo hello");
  }

  #[test]
  fn missing_file_is_a_read_error() {
    let temp = TempDir::new().unwrap();
    let err = load_workflow(&temp.path().join("none.yml")).unwrap_err();
    assert!(matches!(err, LoadError::Read { .. }));
  }

  #[test]
  fn malformed_document_is_a_parse_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("bad.yml");
    fs::write(&path, "jobs:\n  - not a map\n").unwrap();
    assert!(matches!(load_workflow(&path), Err(LoadError::Parse { .. })));
  }

  #[test]
  fn empty_document_is_empty_workflow() {
    assert_eq!(parse_workflow("\n").unwrap(), Workflow::default());
  }
}
