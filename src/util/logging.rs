// FormSnap - util/logging.rs
//
// Structured logging with runtime-selectable debug mode.
//
// Activation:
//   - Environment variable: RUST_LOG=debug (or trace)
//   - CLI flag: --debug
//   - Config file: [logging] level = "debug"
//
// Output: the console (stdout) plus append-mode files in the log directory:
//   debug.log  DEBUG and above
//   error.log  ERROR only
//   info.log   INFO and above (only when [logging] info_log = true)
//
// The returned `LoggingContext` owns the background writer guards. Files are
// flushed and closed when it is dropped or `shutdown` is called.

use crate::util::constants;
use crate::util::error::HarnessError;
use std::io;
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Inputs to [`init`].
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// True when the user passed --debug on the CLI.
    pub debug_flag: bool,
    /// Level from config.toml, if present.
    pub config_level: Option<String>,
    /// Directory receiving the log files.
    pub log_dir: PathBuf,
    /// Also write info.log.
    pub info_log: bool,
}

/// Handle to the installed logging pipeline.
///
/// Must be kept alive for the lifetime of the program; dropping it stops the
/// file writers after flushing whatever is queued.
#[must_use = "dropping the LoggingContext closes the log files"]
pub struct LoggingContext {
    log_dir: PathBuf,
    guards: Vec<WorkerGuard>,
}

impl LoggingContext {
    /// Directory the log files are written to.
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Flush and close every log file.
    pub fn shutdown(self) {
        tracing::debug!(dir = %self.log_dir.display(), "Closing log files");
        drop(self.guards);
    }
}

/// Initialise the logging subsystem.
///
/// Console priority: RUST_LOG env var > CLI --debug flag > config level >
/// default "info". File layers use fixed levels regardless of the console.
pub fn init(options: &LogOptions) -> Result<LoggingContext, HarnessError> {
    std::fs::create_dir_all(&options.log_dir).map_err(|source| HarnessError::Io {
        path: options.log_dir.clone(),
        operation: "create log directory",
        source,
    })?;

    let mut guards = Vec::new();

    let (debug_writer, guard) = tracing_appender::non_blocking(open_appender(
        &options.log_dir,
        constants::DEBUG_LOG_FILE,
    )?);
    guards.push(guard);

    let (error_writer, guard) = tracing_appender::non_blocking(open_appender(
        &options.log_dir,
        constants::ERROR_LOG_FILE,
    )?);
    guards.push(guard);

    let info_layer = if options.info_log {
        let (info_writer, guard) = tracing_appender::non_blocking(open_appender(
            &options.log_dir,
            constants::INFO_LOG_FILE,
        )?);
        guards.push(guard);
        Some(file_layer(info_writer, LevelFilter::INFO))
    } else {
        None
    };

    let directive = console_directive(
        std::env::var("RUST_LOG").ok(),
        options.debug_flag,
        options.config_level.as_deref(),
    );

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_timer(ChronoLocal::new(constants::LOG_TIMESTAMP_FORMAT.to_string()))
        .with_target(false)
        .compact()
        .with_filter(EnvFilter::new(directive));

    let installed = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer(debug_writer, LevelFilter::DEBUG))
        .with(file_layer(error_writer, LevelFilter::ERROR))
        .with(info_layer)
        .try_init();

    if let Err(e) = installed {
        // A subscriber is already installed (tests, embedding); keep it.
        eprintln!("{}: logging already initialised: {e}", constants::APP_NAME);
    }

    tracing::debug!(
        app = constants::APP_NAME,
        version = constants::APP_VERSION,
        dir = %options.log_dir.display(),
        "Logging initialised"
    );

    Ok(LoggingContext {
        log_dir: options.log_dir.clone(),
        guards,
    })
}

/// Pick the console filter directive.
fn console_directive(
    env_value: Option<String>,
    debug_flag: bool,
    config_level: Option<&str>,
) -> String {
    if let Some(env) = env_value.filter(|v| !v.trim().is_empty()) {
        env
    } else if debug_flag {
        "debug".to_string()
    } else if let Some(level) = config_level {
        level.to_string()
    } else {
        constants::DEFAULT_LOG_LEVEL.to_string()
    }
}

/// Non-rotating, append-mode file appender for `file_name` inside `dir`.
fn open_appender(dir: &Path, file_name: &str) -> Result<RollingFileAppender, HarnessError> {
    let (prefix, suffix) = file_name.rsplit_once('.').unwrap_or((file_name, ""));
    let mut builder = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(prefix);
    if !suffix.is_empty() {
        builder = builder.filename_suffix(suffix);
    }
    builder.build(dir).map_err(|e| HarnessError::Io {
        path: dir.join(file_name),
        operation: "open log file",
        source: io::Error::other(e),
    })
}

fn file_layer<S>(writer: NonBlocking, level: LevelFilter) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_timer(ChronoLocal::new(constants::LOG_TIMESTAMP_FORMAT.to_string()))
        .with_target(false)
        .with_filter(level)
}
