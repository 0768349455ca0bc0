//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::compile::{
    DEFAULT_COMPILER, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_OUTPUT_DIR, DEFAULT_TIMEOUT,
};

mod cli;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides, TransportArg};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "mcptex";
const ENV_PREFIX: &str = "MCPTEX";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_REQUEST_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_CONCURRENT_JOBS: u32 = 4;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub compile: CompileSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    Stdio,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Stdio => "stdio",
        }
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "stdio" => Ok(Self::Stdio),
            other => Err(format!("unknown transport `{other}` (expected http or stdio)")),
        }
    }
}

impl From<TransportArg> for Transport {
    fn from(value: TransportArg) -> Self {
        match value {
            TransportArg::Http => Self::Http,
            TransportArg::Stdio => Self::Stdio,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub transport: Transport,
    pub addr: SocketAddr,
    pub max_request_bytes: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct CompileSettings {
    pub compiler: PathBuf,
    pub output_dir: PathBuf,
    pub timeout: Duration,
    pub max_concurrent_jobs: NonZeroU32,
    pub max_output_bytes: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_serve_overrides(&cli.serve);
    if let Some(Command::Serve(args)) = cli.command.as_ref() {
        raw.apply_serve_overrides(&args.overrides);
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    compile: RawCompileSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(transport) = overrides.transport {
            self.server.transport = Some(Transport::from(transport).as_str().to_string());
        }
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.port {
            self.server.port = Some(port);
        }
        if let Some(bytes) = overrides.server_max_request_bytes {
            self.server.max_request_bytes = Some(bytes);
        }
        if let Some(dir) = overrides.output_dir.as_ref() {
            self.compile.output_dir = Some(dir.clone());
        }
        if let Some(compiler) = overrides.compiler.as_ref() {
            self.compile.compiler = Some(compiler.clone());
        }
        if let Some(seconds) = overrides.compile_timeout_seconds {
            self.compile.timeout_seconds = Some(seconds);
        }
        if let Some(jobs) = overrides.compile_max_concurrent_jobs {
            self.compile.max_concurrent_jobs = Some(jobs);
        }
        if let Some(bytes) = overrides.compile_max_output_bytes {
            self.compile.max_output_bytes = Some(bytes);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            compile,
            logging,
        } = raw;

        let server = build_server_settings(server)?;
        let compile = build_compile_settings(compile)?;
        let logging = build_logging_settings(logging)?;

        Ok(Self {
            server,
            compile,
            logging,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let transport = match server.transport {
        Some(value) => Transport::from_str(&value)
            .map_err(|reason| LoadError::invalid("server.transport", reason))?,
        None => Transport::Http,
    };

    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let max_request_bytes = non_zero_usize(
        server.max_request_bytes.unwrap_or(DEFAULT_MAX_REQUEST_BYTES),
        "server.max_request_bytes",
    )?;

    Ok(ServerSettings {
        transport,
        addr,
        max_request_bytes,
    })
}

fn build_compile_settings(compile: RawCompileSettings) -> Result<CompileSettings, LoadError> {
    let compiler = compile
        .compiler
        .unwrap_or_else(|| PathBuf::from(DEFAULT_COMPILER));
    if compiler.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "compile.compiler",
            "path must not be empty",
        ));
    }

    let output_dir = compile
        .output_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    if output_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "compile.output_dir",
            "path must not be empty",
        ));
    }

    let timeout_seconds = compile
        .timeout_seconds
        .unwrap_or(DEFAULT_TIMEOUT.as_secs());
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "compile.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let max_concurrent_jobs = non_zero_u32(
        u64::from(
            compile
                .max_concurrent_jobs
                .unwrap_or(DEFAULT_MAX_CONCURRENT_JOBS),
        ),
        "compile.max_concurrent_jobs",
    )?;

    let max_output_bytes = non_zero_usize(
        compile
            .max_output_bytes
            .unwrap_or(DEFAULT_MAX_OUTPUT_BYTES as u64),
        "compile.max_output_bytes",
    )?;

    Ok(CompileSettings {
        compiler,
        output_dir,
        timeout: Duration::from_secs(timeout_seconds),
        max_concurrent_jobs,
        max_output_bytes,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(true) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    transport: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    max_request_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCompileSettings {
    compiler: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    timeout_seconds: Option<u64>,
    max_concurrent_jobs: Option<u32>,
    max_output_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
