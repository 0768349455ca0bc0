use std::{sync::Arc, time::Instant};

use metrics::{counter, histogram};
use tokio::sync::Semaphore;
use tracing::warn;

use crate::domain::compile::{CompilationResult, CompileRequest, FailureKind};

use super::runner::JobRunner;

pub const METRIC_COMPILE_JOBS_TOTAL: &str = "mcptex_compile_jobs_total";
pub const METRIC_COMPILE_DURATION_MS: &str = "mcptex_compile_duration_ms";

/// Entry point for protocol handlers. Bounds the number of compiler
/// processes alive at once and records per-job metrics.
#[derive(Debug, Clone)]
pub struct CompileService {
    runner: Arc<JobRunner>,
    permits: Arc<Semaphore>,
}

impl CompileService {
    pub fn new(runner: JobRunner, max_concurrent_jobs: usize) -> Self {
        Self {
            runner: Arc::new(runner),
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    pub async fn compile(&self, request: &CompileRequest) -> CompilationResult {
        let started_at = Instant::now();

        let result = match self.permits.acquire().await {
            Ok(_permit) => self.runner.run(&request.document, &request.options).await,
            Err(err) => {
                warn!(
                    target = "application::compile::service",
                    op = "compile_service::compile",
                    result = "error",
                    error = %err,
                    "Compile permits closed"
                );
                CompilationResult::failure(
                    FailureKind::CompilerInvocationFailed,
                    "compile service is shutting down",
                )
            }
        };

        counter!(METRIC_COMPILE_JOBS_TOTAL, "outcome" => result.outcome()).increment(1);
        histogram!(METRIC_COMPILE_DURATION_MS, "outcome" => result.outcome())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        result
    }

    /// Stop admitting new jobs. Jobs already holding a permit run to completion.
    ///
    /// Called once the server starts shutting down.
    pub fn close(&self) {
        self.permits.close();
    }
}
