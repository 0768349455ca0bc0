use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};

/// Command-line arguments for the mcptex binary.
#[derive(Debug, Parser)]
#[command(
    name = "mcptex",
    version,
    about = "MCP server that converts LaTeX documents to PDF"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MCPTEX_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub serve: ServeOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the MCP server on the configured transport.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    Http,
    Stdio,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Transport protocol to use (http or stdio).
    #[arg(short = 't', long = "transport", value_name = "TRANSPORT", value_enum)]
    pub transport: Option<TransportArg>,

    /// Override the HTTP listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Port to run the HTTP server on.
    #[arg(long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Override the maximum accepted HTTP request body in bytes.
    #[arg(long = "server-max-request-bytes", value_name = "BYTES")]
    pub server_max_request_bytes: Option<u64>,

    /// Base directory for per-job workspaces.
    #[arg(long = "output-dir", value_name = "PATH")]
    pub output_dir: Option<PathBuf>,

    /// Compiler executable name or path.
    #[arg(long = "compiler", value_name = "PATH")]
    pub compiler: Option<PathBuf>,

    /// Override the per-job compiler deadline.
    #[arg(long = "compile-timeout-seconds", value_name = "SECONDS")]
    pub compile_timeout_seconds: Option<u64>,

    /// Override the number of compiler processes allowed at once.
    #[arg(long = "compile-max-concurrent-jobs", value_name = "COUNT")]
    pub compile_max_concurrent_jobs: Option<u32>,

    /// Override the captured compiler output limit per stream in bytes.
    #[arg(long = "compile-max-output-bytes", value_name = "BYTES")]
    pub compile_max_output_bytes: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}
