//! Spawning the compiler and collecting what it prints.

use std::{
    path::Path,
    process::{ExitStatus, Stdio},
    time::{Duration, Instant},
};

use thiserror::Error;
use tokio::{
    io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    process::Command,
};
use tracing::debug;

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("failed to spawn compiler: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed waiting for compiler: {0}")]
    Wait(#[source] std::io::Error),
    #[error("compiler did not finish within {}s", limit.as_secs())]
    TimedOut { limit: Duration, output: String },
}

/// Result of a compiler run that finished before the deadline.
#[derive(Debug)]
pub struct Invocation {
    pub status: ExitStatus,
    /// Standard output followed by standard error, lossily decoded.
    pub output: String,
    pub elapsed: Duration,
}

/// Everything needed to run the compiler once.
#[derive(Debug)]
pub struct InvocationSpec<'a> {
    pub program: &'a Path,
    pub args: &'a [String],
    pub working_dir: &'a Path,
    pub stdin: &'a [u8],
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

/// Run the compiler, feed it `stdin`, and wait for it within `timeout`.
///
/// The deadline covers the whole run: the child exiting and both output
/// pipes reaching end of file. The child leads its own process group, so
/// anything it spawns that still holds a pipe is killed with it. Output past
/// `max_output_bytes` is read and discarded so the child never sees a broken
/// pipe.
pub async fn invoke(spec: InvocationSpec<'_>) -> Result<Invocation, InvocationError> {
    let started_at = Instant::now();
    let deadline = tokio::time::Instant::now() + spec.timeout;

    let mut command = Command::new(spec.program);
    command
        .args(spec.args)
        .current_dir(spec.working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(InvocationError::Spawn)?;
    let pid = child.id();

    let limit = spec.max_output_bytes as u64;
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();

    let finished = tokio::time::timeout_at(deadline, async {
        let (status, (), (), ()) = tokio::join!(
            child.wait(),
            feed(stdin, spec.stdin),
            drain(stdout, &mut stdout_buf, limit),
            drain(stderr, &mut stderr_buf, limit),
        );
        status
    })
    .await;

    // Whatever is left in the group has outlived the compiler.
    kill_process_group(pid);

    match finished {
        Ok(Ok(status)) => Ok(Invocation {
            status,
            output: join_output(&stdout_buf, &stderr_buf),
            elapsed: started_at.elapsed(),
        }),
        Ok(Err(err)) => Err(InvocationError::Wait(err)),
        Err(_elapsed) => {
            if let Err(err) = child.kill().await {
                debug!(
                    target = "application::compile::process",
                    error = %err,
                    "Failed to kill timed out compiler"
                );
            }
            Err(InvocationError::TimedOut {
                limit: spec.timeout,
                output: join_output(&stdout_buf, &stderr_buf),
            })
        }
    }
}

async fn feed<W: AsyncWrite + Unpin>(handle: Option<W>, input: &[u8]) {
    let Some(mut handle) = handle else {
        return;
    };
    // A compiler that halts early closes its end of the pipe; that is not our error.
    if let Err(err) = handle.write_all(input).await {
        debug!(
            target = "application::compile::process",
            error = %err,
            "Compiler closed stdin before reading the whole document"
        );
    }
}

/// Keep the first `limit` bytes in `buf` and discard the rest until end of file.
async fn drain<R: AsyncRead + Unpin>(handle: Option<R>, buf: &mut Vec<u8>, limit: u64) {
    let Some(mut handle) = handle else {
        return;
    };
    let drained = match (&mut handle).take(limit).read_to_end(buf).await {
        Ok(_) => io::copy(&mut handle, &mut io::sink()).await.map(|_| ()),
        Err(err) => Err(err),
    };
    if let Err(err) = drained {
        debug!(
            target = "application::compile::process",
            error = %err,
            "Failed to read compiler output"
        );
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // Safety: killpg only sends a signal; the group id is the child's own pid.
    let ret = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            debug!(
                target = "application::compile::process",
                pgid,
                error = %err,
                "Failed to kill compiler process group"
            );
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

fn join_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut output = String::from_utf8_lossy(stdout).into_owned();
    if !stderr.is_empty() {
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(&String::from_utf8_lossy(stderr));
    }
    output
}
