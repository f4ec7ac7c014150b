//! Package identity and metadata.
//!
//! - [`types`] - metadata descriptors and dependency references
//! - [`file`] - reading and writing metadata files

pub mod file;
mod types;

pub use file::{MetaError, MetadataWriter, PkgPointer, YamlMetadataWriter, read_meta};
pub use types::*;
