//! Configuration handling for hookgraph.
//!
//! This crate handles:
//! - Locating, fetching and parsing a commit's `.taskclusterrc`
//! - Compiling it into a task graph for the triggering event
//! - The worker's own KDL service configuration

pub mod compiler;
pub mod error;
pub mod system;
pub mod taskclusterrc;

pub use compiler::{ActivationPolicy, CompilerOptions, GraphCompiler};
pub use error::{ConfigError, ConfigResult};
pub use system::SystemConfig;
