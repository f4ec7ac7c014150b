//! End-to-end tests of `WorkflowEngine` with in-memory collaborators.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use hpb_lib::package::{DepKey, MetaError, MetadataWriter, PackageMeta, PkgPointer};
use hpb_lib::workflow::{BuildError, ConfigError};
use tempfile::TempDir;

use super::common::*;

mod dependencies {
  use super::*;

  const APP: &str = r#"
deps:
  - maintainer: acme
    name: liba
    tag: v1.2.0
  - maintainer: acme
    name: libb
    tag: v1.0.0
test_deps:
  - maintainer: google
    name: googletest
    tag: v1.13.0
jobs: {}
"#;

  fn index() -> MemoryIndex {
    MemoryIndex::new(vec![
      package("acme", "liba", "v1.2.0"),
      package("acme", "liba", "v1.5.0"),
      with_deps(package("acme", "libb", "v1.0.0"), &[("acme", "liba", "v1.5.0")]),
      package("google", "googletest", "v1.13.0"),
    ])
  }

  #[tokio::test]
  async fn transitive_versions_are_coalesced() {
    let temp = TempDir::new().unwrap();
    let request = project(&temp, "app.yml", APP);
    let fetcher = MarkerFetcher::default();
    let fetched = fetcher.fetched.clone();

    let report = engine(&temp)
      .with_index(Box::new(index()))
      .with_fetcher(Box::new(fetcher))
      .run(&request)
      .await
      .unwrap();

    assert_eq!(
      report.deps,
      vec![DepKey::new("acme", "liba", "v1.5.0"), DepKey::new("acme", "libb", "v1.0.0")]
    );
    assert!(report.dirs.deps.join("liba-v1.5.0.marker").exists());
    assert!(!report.dirs.deps.join("liba-v1.2.0.marker").exists());
    assert_eq!(fetched.lock().unwrap().len(), 3);

    let libb = &report.meta.deps[1];
    assert_eq!(libb.deps.len(), 1);
    assert_eq!(libb.deps[0].tag, "v1.5.0");
  }

  #[tokio::test]
  async fn test_deps_land_in_their_own_directory() {
    let temp = TempDir::new().unwrap();
    let request = project(&temp, "app.yml", APP);

    let report = engine(&temp)
      .with_index(Box::new(index()))
      .with_fetcher(Box::new(MarkerFetcher::default()))
      .run(&request)
      .await
      .unwrap();

    assert_eq!(report.test_deps, vec![DepKey::new("google", "googletest", "v1.13.0")]);
    assert!(report.dirs.test_deps.join("googletest-v1.13.0.marker").exists());
    assert!(!report.dirs.deps.join("googletest-v1.13.0.marker").exists());
  }

  #[tokio::test]
  async fn fat_packages_hide_their_deps() {
    let temp = TempDir::new().unwrap();
    let request = project(
      &temp,
      "app.yml",
      "deps:\n  - maintainer: acme\n    name: bundle\n    tag: v2.0.0\njobs: {}\n",
    );
    let index = MemoryIndex::new(vec![fat(with_deps(
      package("acme", "bundle", "v2.0.0"),
      &[("acme", "missing", "v9.9.9")],
    ))]);
    let queries = index.queries.clone();

    let report = engine(&temp)
      .with_index(Box::new(index))
      .with_fetcher(Box::new(MarkerFetcher::default()))
      .run(&request)
      .await
      .unwrap();

    assert_eq!(report.deps, vec![DepKey::new("acme", "bundle", "v2.0.0")]);
    assert_eq!(*queries.lock().unwrap(), vec!["acme/bundle@v2.0.0"]);
  }

  #[tokio::test]
  async fn unresolved_dep_names_the_reference() {
    let temp = TempDir::new().unwrap();
    let request = project(
      &temp,
      "app.yml",
      "deps:\n  - maintainer: acme\n    name: ghost\n    tag: v1.0.0\njobs:\n  a:\n    steps:\n      - run: touch ran\n",
    );

    let err = engine(&temp)
      .with_index(Box::new(index()))
      .with_fetcher(Box::new(MarkerFetcher::default()))
      .run(&request)
      .await
      .unwrap_err();

    match err {
      BuildError::DependencyResolution(e) => assert_eq!(*e.key(), DepKey::new("acme", "ghost", "v1.0.0")),
      other => panic!("expected dependency error, got {other:?}"),
    }
    assert!(!request.working_dir.join("ran").exists());
  }

  #[tokio::test]
  async fn dep_fields_are_variable_resolved() {
    let temp = TempDir::new().unwrap();
    let request = project(
      &temp,
      "app.yml",
      "variables:\n  - LIBA_TAG: v1.2.0\ndeps:\n  - maintainer: acme\n    name: liba\n    tag: ${LIBA_TAG}\njobs: {}\n",
    );

    let report = engine(&temp)
      .with_index(Box::new(index()))
      .with_fetcher(Box::new(MarkerFetcher::default()))
      .run(&request)
      .await
      .unwrap();

    assert_eq!(report.deps, vec![DepKey::new("acme", "liba", "v1.2.0")]);
  }

  #[tokio::test]
  async fn unquoted_float_tag_is_found() {
    let temp = TempDir::new().unwrap();
    let request = project(
      &temp,
      "app.yml",
      "variables:\n  - VER: 2.0\ndeps:\n  - maintainer: acme\n    name: libc\n    tag: 1.0\n  - maintainer: acme\n    name: libd\n    tag: ${VER}\njobs: {}\n",
    );
    let index = MemoryIndex::new(vec![package("acme", "libc", "1.0"), package("acme", "libd", "2.0")]);

    let report = engine(&temp)
      .with_index(Box::new(index))
      .with_fetcher(Box::new(MarkerFetcher::default()))
      .run(&request)
      .await
      .unwrap();

    assert_eq!(
      report.deps,
      vec![DepKey::new("acme", "libc", "1.0"), DepKey::new("acme", "libd", "2.0")]
    );
  }
}

mod sources {
  use super::*;

  #[tokio::test]
  #[cfg(unix)]
  async fn remote_source_path_is_exposed() {
    let temp = TempDir::new().unwrap();
    let checkout = temp.path().join("checkout");
    fs::create_dir_all(&checkout).unwrap();
    fs::write(checkout.join("CMakeLists.txt"), "").unwrap();

    let request = project(
      &temp,
      "zlib.yml",
      r#"
source:
  maintainer: madler
  name: zlib
  tag: v1.3.0
  repo_kind: git
  repo_url: https://example.invalid/zlib.git
  git_depth: 0
jobs:
  check:
    steps:
      - run: test -f ${HPB_SOURCE_PATH}/CMakeLists.txt
"#,
    );
    let requested = Arc::new(Mutex::new(Vec::new()));
    let sources = FixedSource {
      path: checkout.clone(),
      requested: requested.clone(),
    };

    let report = engine(&temp)
      .with_source_fetcher(Box::new(sources))
      .run(&request)
      .await
      .unwrap();

    assert_eq!(report.source_path, checkout);
    assert_eq!(report.meta.maintainer, "madler");
    assert_eq!(report.meta.tag, "v1.3.0");
    let requested = requested.lock().unwrap();
    assert_eq!(requested[0].git_depth, 0);
    assert_eq!(requested[0].repo_url, "https://example.invalid/zlib.git");
  }

  #[tokio::test]
  async fn unsupported_repo_kind_is_configuration_error() {
    let temp = TempDir::new().unwrap();
    let request = project(
      &temp,
      "zlib.yml",
      "source:\n  maintainer: madler\n  name: zlib\n  tag: v1\n  repo_kind: svn\n  repo_url: svn://x\njobs: {}\n",
    );

    assert!(matches!(
      engine(&temp).run(&request).await,
      Err(BuildError::Configuration(ConfigError::Source(_)))
    ));
  }

  #[tokio::test]
  async fn source_without_kind_uses_working_dir() {
    let temp = TempDir::new().unwrap();
    let request = project(&temp, "zlib.yml", "source:\n  name: zlib\njobs: {}\n");

    let report = engine(&temp).run(&request).await.unwrap();
    assert_eq!(report.source_path, request.working_dir);
    assert_eq!(report.meta.name, "zlib");
  }
}

mod variables {
  use super::*;

  #[tokio::test]
  #[cfg(unix)]
  async fn platform_values_follow_the_host() {
    let temp = TempDir::new().unwrap();
    let request = project(
      &temp,
      "cc.yml",
      r#"
variables:
  - CC:
      linux: gcc
      darwin: clang
      default: cc
jobs:
  build:
    steps:
      - run: echo ${CC} > cc.txt
"#,
    );

    let mut platform = host();
    platform.system = "darwin".to_string();
    engine(&temp).with_platform(platform).run(&request).await.unwrap();

    assert_eq!(fs::read_to_string(request.working_dir.join("cc.txt")).unwrap(), "clang\n");
  }

  #[tokio::test]
  async fn late_reference_to_source_facts_resolves() {
    let temp = TempDir::new().unwrap();
    let request = project(
      &temp,
      "app.yml",
      "variables:\n  - INCLUDE: ${HPB_SOURCE_PATH}/include\nbuild:\n  cc: ${INCLUDE}\njobs: {}\n",
    );

    let report = engine(&temp).run(&request).await.unwrap();
    assert_eq!(
      report.meta.build.compiler.cc,
      format!("{}/include", request.working_dir.display())
    );
  }

  #[tokio::test]
  async fn unresolvable_variable_fails() {
    let temp = TempDir::new().unwrap();
    let request = project(&temp, "app.yml", "variables:\n  - A: ${NOPE}\njobs: {}\n");

    match engine(&temp).run(&request).await.unwrap_err() {
      BuildError::VariableResolution { source, .. } => assert_eq!(source.token(), "NOPE"),
      other => panic!("expected variable resolution error, got {other:?}"),
    }
  }
}

mod metadata {
  use super::*;

  struct FailingWriter;

  impl MetadataWriter for FailingWriter {
    fn write(&self, build_dir: &Path, _meta: &PackageMeta, _pointer: &PkgPointer) -> Result<std::path::PathBuf, MetaError> {
      Err(MetaError::Write {
        path: build_dir.to_path_buf(),
        source: std::io::Error::other("disk full"),
      })
    }
  }

  #[tokio::test]
  async fn metadata_failure_stops_before_jobs() {
    let temp = TempDir::new().unwrap();
    let request = project(&temp, "app.yml", "jobs:\n  a:\n    steps:\n      - run: touch ran\n");

    let err = engine(&temp)
      .with_metadata_writer(Box::new(FailingWriter))
      .run(&request)
      .await
      .unwrap_err();

    assert!(matches!(err, BuildError::Metadata(_)));
    assert!(!request.working_dir.join("ran").exists());
  }

  #[tokio::test]
  async fn pointer_names_build_directories() {
    let temp = TempDir::new().unwrap();
    let request = project(&temp, "app.yml", "jobs: {}\n");

    let report = engine(&temp).run(&request).await.unwrap();
    let pointer: PkgPointer = serde_yaml::from_str(&fs::read_to_string(report.dirs.hpb.join("pkg.yml")).unwrap()).unwrap();

    assert_eq!(pointer.meta_file, report.meta_file);
    assert_eq!(pointer.output_dir, report.dirs.output);
    assert_eq!(pointer.deps_dir, report.dirs.deps);
    assert_eq!(pointer.repo_path, report.meta.pkg_relpath());
    assert_eq!(
      pointer.pkg_file,
      report.dirs.pkg.join(format!("{}.tar.gz", report.meta.pkg_file_stem()))
    );
  }
}
