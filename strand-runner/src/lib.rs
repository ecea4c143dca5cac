//! Strand Runner
//!
//! Executes external genomics tools inside a container runtime.
//!
//! Architecture:
//! - Configuration: container image, data volume and timeout settings
//! - Container: the subprocess executor behind the [`CommandRunner`] trait
//! - Stages: builders that turn stage inputs into tool invocations
//!
//! Every invocation yields exactly one `CommandResult`; no error escapes the
//! executor boundary.

pub mod config;
pub mod container;
pub mod stages;

pub use config::{RunnerConfig, StageConfig};
pub use container::{CommandRunner, ContainerExecutor, check_runtime_available};
pub use stages::GatkStages;
