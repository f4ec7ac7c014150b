//! Build command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
#[cfg(unix)]
fn build_echo_hello_writes_trace() {
  let env = TestEnv::with_workflow("hello.yml", "jobs:\n  build:\n    steps:\n      - run: echo hello\n");

  env
    .build_cmd("hello.yml")
    .assert()
    .success()
    .stdout(predicate::str::contains("Built"));

  let trace = env.read_project_file("build/_hpb/workflow.log");
  let lines: Vec<&str> = trace.lines().collect();
  assert!(lines.contains(&"COMMAND|echo hello"));
  assert!(lines.contains(&"INFO|hello"));
}

#[test]
fn undefined_variable_fails_before_running() {
  let env = TestEnv::with_workflow(
    "bad.yml",
    "jobs:\n  first:\n    steps:\n      - run: echo first\n  second:\n    steps:\n      - run: echo ${UNDEFINED}\n",
  );

  env
    .build_cmd("bad.yml")
    .assert()
    .failure()
    .stderr(predicate::str::contains("UNDEFINED"));

  let trace = env.read_project_file("build/_hpb/workflow.log");
  assert!(!trace.contains("COMMAND|"));
}

#[test]
#[cfg(unix)]
fn multi_line_run_block_changes_directory() {
  let env = TestEnv::with_workflow(
    "block.yml",
    r#"
jobs:
  build:
    steps:
      - run: |
          mkdir -p sub
          cd sub
          touch marker
"#,
  );

  env.build_cmd("block.yml").assert().success();
  assert!(env.project_path().join("sub/marker").exists());
}

#[test]
#[cfg(unix)]
fn build_log_follows_file_level() {
  let env = TestEnv::with_workflow("hello.yml", "jobs:\n  build:\n    steps:\n      - run: echo hello\n");
  env.write_file("config/hpb/settings.yml", "log:\n  console_level: error\n  file_level: info\n");

  env.build_cmd("hello.yml").assert().success();

  let log = env.read_project_file("build/_hpb/log/build.log");
  assert!(log.contains("starting build"));
  assert!(log.contains("hello"));
  assert!(!log.contains("DEBUG"));
}

#[test]
fn cyclic_jobs_fail() {
  let env = TestEnv::with_workflow("cycle.yml", "jobs:\n  a:\n    needs: [b]\n  b:\n    needs: [a]\n");

  env
    .build_cmd("cycle.yml")
    .assert()
    .failure()
    .stderr(predicate::str::contains("cycle"));
}

#[test]
#[cfg(unix)]
fn jobs_run_in_needs_order() {
  let env = TestEnv::with_workflow(
    "order.yml",
    r#"
jobs:
  package:
    needs: [build]
    steps:
      - run: echo package >> order.txt
  build:
    needs: [configure]
    steps:
      - run: echo build >> order.txt
  configure:
    steps:
      - run: echo configure >> order.txt
"#,
  );

  env.build_cmd("order.yml").assert().success();
  assert_eq!(env.read_project_file("order.txt"), "configure\nbuild\npackage\n");
}

#[test]
#[cfg(unix)]
fn params_and_inner_variables_reach_steps() {
  let env = TestEnv::with_workflow(
    "params.yml",
    r#"
variables:
  - GREETING: hello ${WHO}
jobs:
  build:
    steps:
      - run: echo "${GREETING} from ${HPB_TASK_NAME}" > greeting.txt
"#,
  );

  env
    .build_cmd("params.yml")
    .arg("-p")
    .arg("WHO=world")
    .assert()
    .success();

  assert_eq!(env.read_project_file("greeting.txt"), "hello world from params\n");
}

#[test]
#[cfg(unix)]
fn ignored_steps_are_skipped() {
  let env = TestEnv::with_workflow(
    "skip.yml",
    r#"
jobs:
  build:
    steps:
      - run: touch skipped.txt
        ignore: ${SKIP}
      - run: touch kept.txt
"#,
  );

  env
    .build_cmd("skip.yml")
    .args(["-p", "SKIP=yes"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Steps skipped: 1"));

  let project = env.project_path();
  assert!(!project.join("skipped.txt").exists());
  assert!(project.join("kept.txt").exists());
}

#[test]
#[cfg(unix)]
fn failing_step_stops_the_build() {
  let env = TestEnv::with_workflow(
    "fail.yml",
    "jobs:\n  a:\n    steps:\n      - run: exit 7\n  b:\n    needs: [a]\n    steps:\n      - run: touch b.txt\n",
  );

  env
    .build_cmd("fail.yml")
    .assert()
    .failure()
    .stderr(predicate::str::contains("code 7"));

  assert!(!env.project_path().join("b.txt").exists());
}

#[test]
#[cfg(unix)]
fn task_mode_writes_metadata_under_task_dir() {
  let env = TestEnv::with_workflow(
    "zlib.linux.yml",
    "build:\n  build_type: debug\njobs:\n  build:\n    steps:\n      - run: echo ok\n",
  );

  env
    .build_cmd("zlib.linux.yml")
    .args(["-m", "task", "--task-id", "t1"])
    .assert()
    .success();

  let task_dir = env.project_path().join("_hpb").join("zlib.t1");
  let meta = std::fs::read_to_string(task_dir.join("hpb.yml")).unwrap();
  assert!(meta.contains("name: zlib"));
  assert!(meta.contains("build_type: debug"));
  assert!(task_dir.join("pkg.yml").exists());
  assert!(task_dir.join("build").is_dir());
}
