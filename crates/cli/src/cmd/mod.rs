mod build;
mod pull;
mod search;

pub use build::{BuildArgs, cmd_build};
pub use pull::cmd_pull;
pub use search::cmd_search;
