//! hpb-lib: Core types and logic for hpb
//!
//! hpb builds source packages from declarative workflows:
//! - `Workflow`: variables, a source, dependencies and jobs made of shell steps
//! - `VarStore`: layered `${NAME}` substitution used for all workflow text
//! - `DependencyResolver`: turns dependency references into a coalesced download set
//! - `WorkflowEngine`: runs one build end to end and writes its package metadata

pub mod consts;
pub mod deps;
pub mod execute;
pub mod package;
pub mod platform;
pub mod repo;
pub mod semver;
pub mod settings;
pub mod source;
pub mod vars;
pub mod workflow;
