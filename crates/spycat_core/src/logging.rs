//! Process-wide logging bootstrap.
//!
//! # Responsibility
//! - Start the `flexi_logger` backend exactly once per process, writing to
//!   rolling files under a log directory or to stderr when none is given.
//! - Capture panics as log events.
//!
//! # Invariants
//! - Initialization is idempotent for the same sink and level.
//! - Initialization never panics.
//! - Switching sink or level after initialization is rejected.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "spycat";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    Stderr,
    Directory(PathBuf),
}

impl Display for LogSink {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stderr => write!(f, "stderr"),
            Self::Directory(dir) => write!(f, "{}", dir.display()),
        }
    }
}

struct LoggingState {
    level: &'static str,
    sink: LogSink,
    _logger: LoggerHandle,
}

/// Initializes logging at `level`, into rolling files under `log_dir` or to
/// stderr when `log_dir` is `None`.
///
/// # Errors
/// - Unsupported `level`.
/// - `log_dir` empty, relative, or not creatable.
/// - Backend start failure, or a conflicting earlier initialization.
pub fn init_logging(level: &str, log_dir: Option<&str>) -> Result<(), String> {
    let level = normalize_level(level)?;
    let sink = match log_dir {
        Some(dir) => LogSink::Directory(normalize_log_dir(dir)?),
        None => LogSink::Stderr,
    };

    let state = LOGGING_STATE.get_or_try_init(|| start_logger(level, sink.clone()))?;
    if state.sink != sink {
        return Err(format!(
            "logging already initialized at `{}`; refusing to switch to `{}`",
            state.sink, sink
        ));
    }
    if state.level != level {
        return Err(format!(
            "logging already initialized with level `{}`; refusing to switch to `{}`",
            state.level, level
        ));
    }
    Ok(())
}

fn start_logger(level: &'static str, sink: LogSink) -> Result<LoggingState, String> {
    let logger = Logger::try_with_str(level)
        .map_err(|err| format!("invalid log level `{level}`: {err}"))?;

    let logger = match &sink {
        LogSink::Stderr => logger
            .log_to_stderr()
            .format_for_stderr(flexi_logger::detailed_format),
        LogSink::Directory(dir) => {
            std::fs::create_dir_all(dir).map_err(|err| {
                format!("failed to create log directory `{}`: {err}", dir.display())
            })?;
            logger
                .log_to_file(
                    FileSpec::default()
                        .directory(dir.as_path())
                        .basename(LOG_FILE_BASENAME),
                )
                .rotate(
                    Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(MAX_LOG_FILES),
                )
                .write_mode(WriteMode::BufferAndFlush)
                .append()
                .format_for_files(flexi_logger::detailed_format)
        }
    };
    let handle = logger
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    install_panic_hook_once();
    info!(
        "event=logging_init module=logging status=ok level={} sink={} version={}",
        level,
        sink,
        env!("CARGO_PKG_VERSION")
    );

    Ok(LoggingState {
        level,
        sink,
        _logger: handle,
    })
}

/// Active `(level, sink)`, or `None` before initialization.
pub fn logging_status() -> Option<(&'static str, LogSink)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.level, state.sink.clone()))
}

/// `debug` in debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

pub(crate) fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

pub(crate) fn normalize_log_dir(log_dir: &str) -> Result<PathBuf, String> {
    let trimmed = log_dir.trim();
    if trimmed.is_empty() {
        return Err("log_dir cannot be empty".to_string());
    }
    let path = Path::new(trimmed);
    if !path.is_absolute() {
        return Err(format!("log_dir must be an absolute path, got `{trimmed}`"));
    }
    Ok(path.to_path_buf())
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        // Payloads may carry request data: single line, capped.
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        error!(
            "event=panic_captured module=logging status=error location={} payload={}",
            location,
            panic_payload_summary(panic_info)
        );
        previous_hook(panic_info);
    }));
}

fn panic_payload_summary(info: &std::panic::PanicHookInfo<'_>) -> String {
    let payload = if let Some(message) = info.payload().downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = info.payload().downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };
    sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
}

fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}
