//! Build orchestration.
//!
//! A build runs in this order:
//!
//! 1. load the workflow and lay out the build directories
//! 2. seed the variable store with parameters, directories and platform facts
//! 3. resolve declared variables (references to source facts may still fail)
//! 4. locate or fetch the source, then add its git facts and resolve again
//! 5. resolve `deps` and `test_deps` into their directories
//! 6. order the jobs and resolve every step
//! 7. write package metadata
//! 8. run the jobs
//!
//! Every failure stops the build. Whatever is on disk at that point is left
//! for inspection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::dirs::{BuildDirs, BuildMode};
use super::load::{LoadError, load_workflow};
use super::types::{DepSpec, Ordered};
use crate::consts::{META_FILENAME, TRACE_FILENAME};
use crate::deps::{DependencyResolver, DepsError};
use crate::execute::{CommandExecutor, ExecuteError, RunReport, ScheduleError, TraceLog, prepare, run};
use crate::package::{
  BuildInfo, CompilerInfo, DepItem, DepKey, LinkInfo, MetaError, MetadataWriter, PackageMeta, PkgPointer,
  SourceInfo, YamlMetadataWriter,
};
use crate::platform::{PlatformInfo, libc_name};
use crate::repo::{ArtifactFetcher, IndexError, LocalFetcher, PackageIndex, RepoIndex};
use crate::settings::Settings;
use crate::source::{GitInfo, GitSourceFetcher, SourceError, SourceFetcher};
use crate::vars::{ResolveOptions, Scalar, VarEntry, VarError, VarStore};

/// Variable names consulted, in order, when `build.build_type` is not given.
const BUILD_TYPE_VARS: [&str; 4] = ["build-type", "build_type", "BUILD_TYPE", "BUILDTYPE"];

const DEFAULT_BUILD_TYPE: &str = "release";

/// Problems with the workflow document or configuration, found before any step runs.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error(transparent)]
  Workflow(#[from] LoadError),

  #[error(transparent)]
  Jobs(ScheduleError),

  #[error("invalid source: {0}")]
  Source(SourceError),

  #[error("invalid value '{value}' for '{field}'")]
  InvalidField { field: String, value: String },

  #[error(transparent)]
  Repository(#[from] IndexError),
}

/// Errors that fail a build.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error("configuration error: {0}")]
  Configuration(#[from] ConfigError),

  /// An undefined `${NAME}` reference. `context` names where it appeared.
  #[error("{context}: {source}")]
  VariableResolution {
    context: String,
    #[source]
    source: VarError,
  },

  #[error("dependency resolution failed: {0}")]
  DependencyResolution(#[from] DepsError),

  #[error("job '{job}' step {step} failed: {source}")]
  StepExecution {
    job: String,
    step: usize,
    #[source]
    source: ExecuteError,
  },

  #[error("failed to fetch source: {0}")]
  Source(SourceError),

  #[error("failed to write package metadata: {0}")]
  Metadata(#[from] MetaError),

  #[error("I/O error at '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl BuildError {
  fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
    move |source| BuildError::Io {
      path: path.to_path_buf(),
      source,
    }
  }

  fn unresolved(context: impl Into<String>) -> impl FnOnce(VarError) -> Self {
    let context = context.into();
    move |source| BuildError::VariableResolution { context, source }
  }

  /// Exit code of the failing command, for step failures.
  pub fn exit_code(&self) -> Option<i32> {
    match self {
      BuildError::StepExecution { source, .. } => source.exit_code(),
      _ => None,
    }
  }
}

impl From<ScheduleError> for BuildError {
  fn from(err: ScheduleError) -> Self {
    match err {
      ScheduleError::Unresolved { job, step, source } => BuildError::VariableResolution {
        context: format!("job '{job}' step {step}"),
        source,
      },
      ScheduleError::Step { job, step, source } => BuildError::StepExecution { job, step, source },
      other => BuildError::Configuration(ConfigError::Jobs(other)),
    }
  }
}

impl From<SourceError> for BuildError {
  fn from(err: SourceError) -> Self {
    match err {
      SourceError::MissingField(_) | SourceError::DepthWithoutTag | SourceError::UnsupportedKind(_) => {
        BuildError::Configuration(ConfigError::Source(err))
      }
      other => BuildError::Source(other),
    }
  }
}

/// What to build and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
  /// Project root. Relative config paths and step commands start here.
  pub working_dir: PathBuf,
  pub config_path: PathBuf,
  pub mode: BuildMode,
  /// Defaults to the config file name up to its first `.`.
  pub task_name: Option<String>,
  /// Defaults to the current local time, `YYYYmmdd-HHMMSS-micros`.
  pub task_id: Option<String>,
  /// `key=value` parameters, visible to the workflow as variables.
  pub params: Vec<String>,
}

impl BuildRequest {
  pub fn new(working_dir: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
    Self {
      working_dir: working_dir.into(),
      config_path: config_path.into(),
      mode: BuildMode::Dev,
      task_name: None,
      task_id: None,
      params: Vec::new(),
    }
  }

  pub fn with_mode(mut self, mode: BuildMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn with_params(mut self, params: impl IntoIterator<Item = impl Into<String>>) -> Self {
    self.params = params.into_iter().map(Into::into).collect();
    self
  }

  /// Fix the task name and id, so every later call sees the same directories.
  pub fn pinned(mut self) -> Self {
    self.task_name = Some(self.task_name());
    self.task_id = Some(self.task_id());
    self
  }

  /// Directories this request builds in.
  ///
  /// An unpinned request without a task id gets a new one on every call.
  pub fn dirs(&self) -> BuildDirs {
    BuildDirs::new(&self.working_dir, self.mode, &self.task_name(), &self.task_id())
  }

  fn config_file(&self) -> PathBuf {
    self.working_dir.join(&self.config_path)
  }

  fn task_name(&self) -> String {
    if let Some(name) = &self.task_name {
      return name.clone();
    }
    self
      .config_path
      .file_name()
      .map(|n| n.to_string_lossy())
      .and_then(|n| n.split('.').next().map(str::to_string))
      .unwrap_or_default()
  }

  fn task_id(&self) -> String {
    self
      .task_id
      .clone()
      .unwrap_or_else(|| chrono::Local::now().format("%Y%m%d-%H%M%S-%6f").to_string())
  }
}

/// Outcome of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
  pub meta: PackageMeta,
  pub dirs: BuildDirs,
  pub source_path: PathBuf,
  pub meta_file: PathBuf,
  pub trace_file: PathBuf,
  /// Dependencies downloaded into the deps directory.
  pub deps: Vec<DepKey>,
  pub test_deps: Vec<DepKey>,
  pub run: RunReport,
}

/// Runs workflows with a fixed configuration and set of collaborators.
pub struct WorkflowEngine {
  settings: Settings,
  platform: PlatformInfo,
  index: Box<dyn PackageIndex>,
  fetcher: Box<dyn ArtifactFetcher>,
  sources: Box<dyn SourceFetcher>,
  writer: Box<dyn MetadataWriter>,
}

impl WorkflowEngine {
  /// Engine over the repositories named in `settings`, for the current platform.
  pub fn new(settings: Settings) -> Result<Self, BuildError> {
    let index = RepoIndex::from_settings(&settings).map_err(ConfigError::from)?;
    Ok(Self {
      settings,
      platform: PlatformInfo::detect(),
      index: Box::new(index),
      fetcher: Box::new(LocalFetcher),
      sources: Box::new(GitSourceFetcher),
      writer: Box::new(YamlMetadataWriter),
    })
  }

  pub fn with_platform(mut self, platform: PlatformInfo) -> Self {
    self.platform = platform;
    self
  }

  pub fn with_index(mut self, index: Box<dyn PackageIndex>) -> Self {
    self.index = index;
    self
  }

  pub fn with_fetcher(mut self, fetcher: Box<dyn ArtifactFetcher>) -> Self {
    self.fetcher = fetcher;
    self
  }

  pub fn with_source_fetcher(mut self, sources: Box<dyn SourceFetcher>) -> Self {
    self.sources = sources;
    self
  }

  pub fn with_metadata_writer(mut self, writer: Box<dyn MetadataWriter>) -> Self {
    self.writer = writer;
    self
  }

  pub fn settings(&self) -> &Settings {
    &self.settings
  }

  pub fn platform(&self) -> &PlatformInfo {
    &self.platform
  }

  /// Run one build.
  pub async fn run(&self, request: &BuildRequest) -> Result<BuildReport, BuildError> {
    let config_file = request.config_file();
    let workflow = load_workflow(&config_file).map_err(ConfigError::from)?;

    let task_name = request.task_name();
    let task_id = request.task_id();
    let dirs = BuildDirs::new(&request.working_dir, request.mode, &task_name, &task_id);
    dirs.prepare().map_err(BuildError::io(&dirs.hpb))?;
    info!(task = %task_name, id = %task_id, mode = %request.mode, dir = %dirs.task.display(), "starting build");

    let trace_path = dirs.hpb.join(TRACE_FILENAME);
    let trace = Arc::new(TraceLog::create(&trace_path).map_err(BuildError::io(&trace_path))?);

    let mut vars = VarStore::new();
    apply_params(&mut vars, &request.params);
    dirs.export(&mut vars);
    self.export_facts(&mut vars, &config_file, &task_name, &task_id);

    let mut entries: Vec<VarEntry> = workflow
      .variables_for(&self.platform.system)
      .into_iter()
      .map(|(name, value)| VarEntry::new(name, value))
      .collect();
    let pending = vars.resolve_all(&mut entries, ResolveOptions::default());
    if !pending.is_empty() {
      debug!(count = pending.len(), "variables left for the second pass");
    }

    let source = read_source(&workflow.source, &vars)?;
    let source_path = if source.is_remote() {
      self.sources.fetch(&source, &self.settings.source_path)?
    } else {
      request.working_dir.clone()
    };
    let git = GitInfo::discover(&source_path);
    export_source(&mut vars, &source_path, &git);

    let unresolved = vars.resolve_all(&mut entries, ResolveOptions::default());
    if let Some(source) = unresolved.into_iter().next() {
      return Err(BuildError::VariableResolution {
        context: "variables".to_string(),
        source,
      });
    }

    let build = read_build(&workflow.build, &vars)?;
    let mut meta = PackageMeta {
      name: non_empty(&source.name, &task_name),
      maintainer: source.maintainer.clone(),
      tag: non_empty(&source.tag, &git.git_ref()),
      platform: self.platform.clone(),
      build,
      deps: Vec::new(),
    };
    info!(package = %meta.key(), build_type = %meta.build.build_type, "resolved package");

    let mut deps = dep_items(&workflow.deps, &vars, "deps")?;
    let downloaded = self.resolve_deps(&mut deps, &meta.build.build_type, &dirs.deps)?;
    let mut test_deps = dep_items(&workflow.test_deps, &vars, "test_deps")?;
    let test_downloaded = self.resolve_deps(&mut test_deps, &meta.build.build_type, &dirs.test_deps)?;
    meta.deps = deps;

    let plan = prepare(&workflow.jobs, &vars)?;

    let pointer = PkgPointer::new(
      &meta,
      dirs.hpb.join(META_FILENAME),
      dirs.output.clone(),
      dirs.pkg.clone(),
      dirs.deps.clone(),
    );
    let meta_file = self.writer.write(&dirs.hpb, &meta, &pointer)?;

    let mut exec = CommandExecutor::new(&request.working_dir)
      .with_shell(self.settings.shell.clone())
      .with_trace(trace);
    let report = run(&plan, &mut exec).await?;

    info!(
      jobs = report.jobs.len(),
      steps = report.steps_run,
      skipped = report.steps_skipped,
      "build finished"
    );

    Ok(BuildReport {
      meta,
      dirs,
      source_path,
      meta_file,
      trace_file: trace_path,
      deps: downloaded,
      test_deps: test_downloaded,
      run: report,
    })
  }

  fn export_facts(&self, vars: &mut VarStore, config_file: &Path, task_name: &str, task_id: &str) {
    let file_dir = config_file.parent().map(Path::to_path_buf).unwrap_or_default();
    let file_name = config_file
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();

    vars.set_inner("FILE_DIR", file_dir.display().to_string());
    vars.set_inner("FILE_NAME", file_name);
    vars.set_inner("FILE_PATH", config_file.display().to_string());
    vars.set_inner("TASK_NAME", task_name);
    vars.set_inner("TASK_ID", task_id);

    let platform = &self.platform;
    vars.set_inner("PLATFORM_SYSTEM", platform.system.clone());
    vars.set_inner("PLATFORM_RELEASE", platform.release.clone());
    vars.set_inner("PLATFORM_VERSION", platform.version.clone());
    vars.set_inner("PLATFORM_MACHINE", platform.machine.clone());
    vars.set_inner("PLATFORM_DISTR", platform.distr());
    vars.set_inner("PLATFORM_LIBC", libc_name());
  }

  fn resolve_deps(&self, deps: &mut [DepItem], build_type: &str, dest: &Path) -> Result<Vec<DepKey>, BuildError> {
    if deps.is_empty() {
      return Ok(Vec::new());
    }
    let mut resolver = DependencyResolver::new(self.index.as_ref(), self.fetcher.as_ref(), &self.platform, build_type);
    Ok(resolver.resolve(deps, dest)?)
  }
}

/// Add `key=value` parameters as input variables. Malformed entries are skipped.
fn apply_params(vars: &mut VarStore, params: &[String]) {
  for param in params {
    let parts: Vec<&str> = param.split('=').collect();
    match parts.as_slice() {
      [key, value] if !key.trim().is_empty() => vars.set_input(key.trim(), value.trim()),
      _ => warn!(param = %param, "ignoring malformed parameter, expected key=value"),
    }
  }
}

fn export_source(vars: &mut VarStore, source_path: &Path, git: &GitInfo) {
  vars.set_inner("SOURCE_PATH", source_path.display().to_string());
  vars.set_inner("GIT_REF", git.git_ref());
  vars.set_inner("GIT_TAG", git.tag.clone());
  vars.set_inner("GIT_COMMIT_ID", git.commit_id.clone());
  vars.set_inner("GIT_BRANCH", git.branch.clone());
}

fn non_empty(value: &str, fallback: &str) -> String {
  (if value.is_empty() { fallback } else { value }).to_string()
}

fn resolve_field(section: &str, map: &Ordered<Scalar>, key: &str, vars: &VarStore) -> Result<String, BuildError> {
  match map.get(key) {
    Some(value) => vars
      .resolve_text(&value.to_string())
      .map_err(BuildError::unresolved(format!("{section}.{key}"))),
    None => Ok(String::new()),
  }
}

fn read_source(map: &Ordered<Scalar>, vars: &VarStore) -> Result<SourceInfo, BuildError> {
  let field = |key: &str| resolve_field("source", map, key, vars);

  let mut source = SourceInfo {
    maintainer: field("maintainer")?,
    name: field("name")?,
    tag: field("tag")?,
    repo_kind: field("repo_kind")?,
    repo_url: field("repo_url")?,
    ..Default::default()
  };

  let depth = field("git_depth")?;
  if !depth.is_empty() {
    source.git_depth = depth.trim().parse().map_err(|_| ConfigError::InvalidField {
      field: "source.git_depth".to_string(),
      value: depth.clone(),
    })?;
  }
  Ok(source)
}

fn read_build(map: &Ordered<Scalar>, vars: &VarStore) -> Result<BuildInfo, BuildError> {
  let field = |key: &str| resolve_field("build", map, key, vars);

  let mut build_type = field("build_type")?;
  if build_type.is_empty() {
    build_type = guess_build_type(vars);
  }

  let fat_pkg = match map.get("fat_pkg") {
    Some(value) => vars.is_truthy(value).map_err(BuildError::unresolved("build.fat_pkg"))?,
    None => false,
  };

  let mut libc = field("libc")?;
  if libc.is_empty() {
    libc = libc_name().to_string();
  }

  Ok(BuildInfo {
    build_type,
    fat_pkg,
    compiler: CompilerInfo {
      cc: field("cc")?,
      cc_ver: field("cc_ver")?,
      cxx: field("cxx")?,
      cxx_ver: field("cxx_ver")?,
    },
    link: LinkInfo {
      libc,
      libc_ver: field("libc_ver")?,
    },
  })
}

fn guess_build_type(vars: &VarStore) -> String {
  BUILD_TYPE_VARS
    .iter()
    .find_map(|name| vars.get(name).filter(|v| !v.is_empty()))
    .unwrap_or(DEFAULT_BUILD_TYPE)
    .to_string()
}

fn dep_items(specs: &[DepSpec], vars: &VarStore, section: &str) -> Result<Vec<DepItem>, BuildError> {
  specs
    .iter()
    .enumerate()
    .map(|(i, spec)| {
      let resolve = |value: &str| vars.resolve_text(value).map_err(BuildError::unresolved(format!("{section}[{i}]")));
      Ok::<_, BuildError>(DepItem::new(
        resolve(&spec.maintainer)?,
        resolve(&spec.name)?,
        resolve(&spec.tag)?,
      ))
    })
    .collect()
}
