//! Search, pull and dependency download against a local package repository.

use std::path::{Path, PathBuf};
use std::process::Command;

use predicates::prelude::*;

use super::common::TestEnv;

const ZLIB_META: &str = r#"
name: zlib
maintainer: madler
tag: v1.3.0
build:
  build_type: release
"#;

/// Publish a zlib package with a one-header archive. Returns the variant directory.
fn publish_zlib(env: &TestEnv) -> PathBuf {
  let variant = env.packages_path().join("madler/zlib/v1.3.0/release-any");
  std::fs::create_dir_all(&variant).unwrap();
  std::fs::write(variant.join("hpb.yml"), ZLIB_META).unwrap();

  let payload = env.temp.path().join("payload");
  std::fs::create_dir_all(payload.join("include")).unwrap();
  std::fs::write(payload.join("include/zlib.h"), "#define ZLIB 1\n").unwrap();
  tar_czf(&variant.join("zlib-v1.3.0.tar.gz"), &payload);

  variant
}

fn tar_czf(archive: &Path, dir: &Path) {
  let status = Command::new("tar")
    .arg("czf")
    .arg(archive)
    .arg("-C")
    .arg(dir)
    .arg(".")
    .status()
    .unwrap();
  assert!(status.success());
}

#[test]
#[cfg(unix)]
fn search_finds_published_package() {
  let env = TestEnv::new();
  publish_zlib(&env);

  env
    .hpb_cmd()
    .args(["search", "-m", "madler", "-n", "zlib"])
    .assert()
    .success()
    .stdout(predicate::str::contains("madler/zlib@v1.3.0"))
    .stdout(predicate::str::contains("1 package(s) found"));
}

#[test]
#[cfg(unix)]
fn search_filters_by_tag() {
  let env = TestEnv::new();
  publish_zlib(&env);

  env
    .hpb_cmd()
    .args(["search", "-m", "madler", "-n", "zlib", "-t", "v2.0.0"])
    .assert()
    .success()
    .stdout(predicate::str::contains("No packages found"));
}

#[test]
#[cfg(unix)]
fn pull_extracts_archive() {
  let env = TestEnv::new();
  let variant = publish_zlib(&env);
  let dest = env.temp.path().join("pulled");

  env
    .hpb_cmd()
    .arg("pull")
    .arg("-p")
    .arg(&variant)
    .arg("-d")
    .arg(&dest)
    .assert()
    .success();

  assert!(dest.join("include/zlib.h").exists());
  assert!(!dest.join("zlib-v1.3.0.tar.gz").exists());
}

#[test]
#[cfg(unix)]
fn build_downloads_declared_deps() {
  let env = TestEnv::with_workflow(
    "app.yml",
    r#"
deps:
  - maintainer: madler
    name: zlib
    tag: v1.3.0
jobs:
  build:
    steps:
      - run: test -f ${HPB_DEPS_DIR}/include/zlib.h
"#,
  );
  publish_zlib(&env);

  env
    .build_cmd("app.yml")
    .assert()
    .success()
    .stdout(predicate::str::contains("Dependencies: 1"));

  let meta = env.read_project_file("build/_hpb/hpb.yml");
  assert!(meta.contains("zlib"));
}

#[test]
fn build_fails_on_missing_dep() {
  let env = TestEnv::with_workflow(
    "app.yml",
    "deps:\n  - maintainer: nobody\n    name: ghost\n    tag: v1.0.0\njobs: {}\n",
  );

  env
    .build_cmd("app.yml")
    .assert()
    .failure()
    .stderr(predicate::str::contains("nobody/ghost@v1.0.0"));
}
