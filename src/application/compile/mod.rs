//! Compilation jobs: workspaces, toolchain lookup, compiler invocation.

mod process;
mod runner;
mod service;
mod toolchain;
mod workspace;

pub use process::InvocationError;
pub use runner::{
    ARTIFACT_FILE_NAME, DEFAULT_COMPILER, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_OUTPUT_DIR,
    DEFAULT_TIMEOUT, JobRunner, RunnerConfig,
};
pub use service::{CompileService, METRIC_COMPILE_DURATION_MS, METRIC_COMPILE_JOBS_TOTAL};
pub use toolchain::{ToolchainError, locate as locate_toolchain};
pub use workspace::{Workspace, WorkspaceError};
