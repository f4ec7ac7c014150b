//! Workflow documents and the engine that builds them.

pub mod dirs;
pub mod engine;
pub mod load;
pub mod types;

pub use dirs::{BuildDirs, BuildMode};
pub use engine::{BuildError, BuildReport, BuildRequest, ConfigError, WorkflowEngine};
pub use load::{LoadError, load_workflow, parse_workflow};
pub use types::{DepSpec, Job, Jobs, Ordered, Step, VarValue, Variable, Workflow};
