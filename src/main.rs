use std::process;

use mcptex::{
    application::{
        compile::{CompileService, JobRunner, RunnerConfig, locate_toolchain},
        error::AppError,
    },
    config::{self, Settings, Transport},
    infra::{
        error::InfraError,
        http::{self, HttpState},
        mcp::McpServer,
        stdio,
        telemetry::{self, LogTarget},
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (_cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let log_target = match settings.server.transport {
        Transport::Http => LogTarget::Stdout,
        Transport::Stdio => LogTarget::Stderr,
    };
    telemetry::init(&settings.logging, log_target).map_err(AppError::from)?;

    let service = build_compile_service(&settings);
    let mcp = McpServer::new(service.clone());

    match settings.server.transport {
        Transport::Http => serve_http(&settings, mcp, service).await,
        Transport::Stdio => stdio::serve_stdio(mcp).await.map_err(AppError::from),
    }
}

fn build_compile_service(settings: &Settings) -> CompileService {
    let compile = &settings.compile;

    // A missing toolchain is reported per request; startup only warns.
    if let Err(err) = locate_toolchain(&compile.compiler) {
        warn!(
            target = "mcptex::startup",
            compiler = %compile.compiler.display(),
            error = %err,
            "Compiler not available; compilation requests will fail until it is installed"
        );
    }

    let runner = JobRunner::new(RunnerConfig {
        compiler: compile.compiler.clone(),
        output_dir: compile.output_dir.clone(),
        timeout: compile.timeout,
        max_output_bytes: compile.max_output_bytes.get(),
    });
    CompileService::new(runner, compile.max_concurrent_jobs.get() as usize)
}

async fn serve_http(
    settings: &Settings,
    mcp: McpServer,
    service: CompileService,
) -> Result<(), AppError> {
    let router = http::build_router(
        HttpState { mcp },
        settings.server.max_request_bytes.get(),
    );

    let addr = settings.server.addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| AppError::from(InfraError::Bind { addr, source }))?;

    info!(
        target = "mcptex::http",
        addr = %addr,
        path = http::MCP_PATH,
        "HTTP server listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            service.close();
        })
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    info!(target = "mcptex::http", "HTTP server stopped");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, starting graceful shutdown"),
        () = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }
}
