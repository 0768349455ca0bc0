use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use tracing::{debug, info, instrument, warn};

use crate::domain::{
    compile::{CompilationResult, FailureKind},
    types::{JobId, JobState},
};

use super::{
    process::{self, InvocationError, InvocationSpec},
    toolchain,
    workspace::Workspace,
};

/// Name the compiler gives its output when the document arrives on stdin.
pub const ARTIFACT_FILE_NAME: &str = "texput.pdf";

pub const DEFAULT_COMPILER: &str = "xelatex";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Executable name looked up on `PATH`, or an explicit path.
    pub compiler: PathBuf,
    /// Base directory below which per-job workspaces are created.
    pub output_dir: PathBuf,
    pub timeout: Duration,
    /// Upper bound on captured bytes per output stream.
    pub max_output_bytes: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            compiler: PathBuf::from(DEFAULT_COMPILER),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Runs one compilation job end to end.
#[derive(Debug, Clone)]
pub struct JobRunner {
    config: RunnerConfig,
}

impl JobRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Compile `source` with the caller's `options` appended to the mandatory flags.
    pub async fn run(&self, source: &str, options: &[String]) -> CompilationResult {
        self.run_job(JobId::new(), source, options).await
    }

    #[instrument(skip_all, fields(job_id = %job_id))]
    async fn run_job(&self, job_id: JobId, source: &str, options: &[String]) -> CompilationResult {
        let started_at = Instant::now();
        let mut job = JobLifecycle::new(job_id);

        let compiler = match toolchain::locate(&self.config.compiler) {
            Ok(path) => path,
            Err(err) => {
                warn!(
                    target = "application::compile::runner",
                    op = "runner::locate",
                    result = "error",
                    error_code = "toolchain_not_found",
                    error = %err,
                    "Compiler executable not found"
                );
                job.advance(JobState::Failed);
                job.advance(JobState::Terminated);
                return CompilationResult::failure(
                    FailureKind::ToolchainNotFound,
                    "compiler executable not found",
                );
            }
        };

        let workspace = match Workspace::prepare(&self.config.output_dir, job_id).await {
            Ok(workspace) => workspace,
            Err(err) => {
                warn!(
                    target = "application::compile::runner",
                    op = "runner::acquire_workspace",
                    result = "error",
                    error_code = "workspace_prepare_failed",
                    output_dir = %self.config.output_dir.display(),
                    error = %err,
                    "Failed to prepare job workspace"
                );
                job.advance(JobState::Failed);
                job.advance(JobState::Terminated);
                return CompilationResult::failure(
                    FailureKind::WorkspacePrepareFailed,
                    "failed to prepare working area",
                );
            }
        };
        job.advance(JobState::WorkspaceReady);

        let result = self
            .compile_in(&mut job, &compiler, &workspace, source, options)
            .await;

        workspace.dispose().await;
        job.advance(JobState::Terminated);

        info!(
            target = "application::compile::runner",
            op = "runner::run",
            result = result.outcome(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Compilation job finished"
        );

        result
    }

    async fn compile_in(
        &self,
        job: &mut JobLifecycle,
        compiler: &Path,
        workspace: &Workspace,
        source: &str,
        options: &[String],
    ) -> CompilationResult {
        let args = compiler_args(workspace.path(), options);
        job.advance(JobState::CompilerRunning);

        debug!(
            target = "application::compile::runner",
            op = "runner::invoke",
            compiler = %compiler.display(),
            args = ?args,
            workspace = %workspace.path().display(),
            "Invoking compiler"
        );

        let invocation = process::invoke(InvocationSpec {
            program: compiler,
            args: &args,
            working_dir: workspace.path(),
            stdin: source.as_bytes(),
            timeout: self.config.timeout,
            max_output_bytes: self.config.max_output_bytes,
        })
        .await;

        let invocation = match invocation {
            Ok(invocation) if invocation.status.success() => invocation,
            Ok(invocation) => {
                warn!(
                    target = "application::compile::runner",
                    op = "runner::invoke",
                    result = "error",
                    error_code = "compiler_invocation_failed",
                    exit_code = invocation.status.code().map(i64::from).unwrap_or(-1),
                    compiler_elapsed_ms = invocation.elapsed.as_millis() as u64,
                    output = %invocation.output,
                    "Compiler exited unsuccessfully"
                );
                job.advance(JobState::Failed);
                return CompilationResult::failure(
                    FailureKind::CompilerInvocationFailed,
                    format!("Failed to convert LaTeX to PDF: {}", invocation.output),
                );
            }
            Err(InvocationError::TimedOut { limit, output }) => {
                warn!(
                    target = "application::compile::runner",
                    op = "runner::invoke",
                    result = "error",
                    error_code = "timeout",
                    timeout_ms = limit.as_millis() as u64,
                    output = %output,
                    "Compiler exceeded deadline and was killed"
                );
                job.advance(JobState::Failed);
                return CompilationResult::failure(
                    FailureKind::Timeout,
                    format!("compiler timed out after {limit:?}"),
                );
            }
            Err(err) => {
                warn!(
                    target = "application::compile::runner",
                    op = "runner::invoke",
                    result = "error",
                    error_code = "compiler_invocation_failed",
                    error = %err,
                    "Failed to run compiler"
                );
                job.advance(JobState::Failed);
                return CompilationResult::failure(
                    FailureKind::CompilerInvocationFailed,
                    format!("Failed to convert LaTeX to PDF: {err}"),
                );
            }
        };

        let artifact_path = workspace.path().join(ARTIFACT_FILE_NAME);
        let location = workspace
            .location()
            .join(ARTIFACT_FILE_NAME)
            .display()
            .to_string();

        let bytes = match tokio::fs::read(&artifact_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(
                    target = "application::compile::runner",
                    op = "runner::collect",
                    result = "error",
                    error_code = "output_artifact_missing",
                    path = %location,
                    output = %invocation.output,
                    "Compiler succeeded but produced no PDF"
                );
                job.advance(JobState::Failed);
                return CompilationResult::failure(
                    FailureKind::OutputArtifactMissing,
                    "PDF file does not exist",
                );
            }
            Err(err) => {
                warn!(
                    target = "application::compile::runner",
                    op = "runner::collect",
                    result = "error",
                    error_code = "artifact_read_failed",
                    path = %location,
                    error = %err,
                    "Failed to read compiled PDF"
                );
                job.advance(JobState::Failed);
                return CompilationResult::failure(
                    FailureKind::ArtifactReadFailed,
                    "Failed to convert LaTeX to PDF",
                );
            }
        };

        job.advance(JobState::Succeeded);
        debug!(
            target = "application::compile::runner",
            op = "runner::collect",
            path = %location,
            pdf_bytes = bytes.len(),
            compiler_elapsed_ms = invocation.elapsed.as_millis() as u64,
            "Compiled PDF read into memory"
        );

        CompilationResult::artifact(bytes, location)
    }
}

/// Mandatory flags first, then the caller's options verbatim.
fn compiler_args(workspace: &Path, options: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(options.len() + 2);
    args.push(format!("-output-directory={}", workspace.display()));
    args.push("-halt-on-error".to_string());
    args.extend(options.iter().cloned());
    args
}

struct JobLifecycle {
    job_id: JobId,
    state: JobState,
}

impl JobLifecycle {
    fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            state: JobState::Created,
        }
    }

    fn advance(&mut self, next: JobState) {
        if !self.state.can_transition_to(next) {
            warn!(
                target = "application::compile::runner",
                op = "runner::advance",
                job_id = %self.job_id,
                from = %self.state,
                to = %next,
                "Illegal job state transition ignored"
            );
            return;
        }
        debug!(
            target = "application::compile::runner",
            op = "runner::advance",
            from = %self.state,
            to = %next,
            "Job state changed"
        );
        self.state = next;
    }
}
