/// Application name, used for directory names and the inner variable prefix.
pub const APP_NAME: &str = "hpb";

/// Prefix applied to inner (derived) variables, e.g. `HPB_ROOT_DIR`.
pub const INNER_VAR_PREFIX: &str = "HPB";

/// Package metadata file written into the build directory and read from package repositories.
pub const META_FILENAME: &str = "hpb.yml";

/// Pointer file naming the output/package/dependency directories for the packaging stage.
pub const PKG_POINTER_FILENAME: &str = "pkg.yml";

/// Structured workflow trace written for every build.
pub const TRACE_FILENAME: &str = "workflow.log";

/// Per-build log written at the configured file level.
pub const BUILD_LOG_FILENAME: &str = "build.log";

/// Settings file name searched in the configuration directories.
pub const SETTINGS_FILENAME: &str = "settings.yml";

/// Archive suffix of packed artifacts.
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";
