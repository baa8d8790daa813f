//! Bridge from the `log` facade to a host-supplied logger.

use std::sync::{Arc, OnceLock};

/// Receiver for log records emitted by the store.
///
/// Implement this to route store logs into the host application's logging.
///
/// # Examples
///
/// ```rust
/// use relstore_core::logger::{LogLevel, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level:?}] {message}");
///     }
/// }
/// ```
pub trait Logger: Sync + Send {
    /// Logs a message at the specified log level.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Very detailed diagnostics.
    Trace,
    /// Debugging information.
    Debug,
    /// Progress of normal operation.
    Info,
    /// Recoverable anomalies (failed best-effort steps, expired keys).
    Warn,
    /// Failed operations.
    Error,
}

/// `log::Log` implementation forwarding to the installed [`Logger`].
struct ForwardingLogger;

impl log::Log for ForwardingLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let from_store = record
            .module_path()
            .is_some_and(|module_path| module_path.starts_with("relstore"));
        let verbose =
            record.level() == log::Level::Debug || record.level() == log::Level::Trace;

        // Debug/trace output of dependencies is noise for the host.
        if verbose && !from_store {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(log_level(record.level()), format!("{}", record.args()));
        }
    }

    fn flush(&self) {}
}

const fn log_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Installs `logger` as the process-wide receiver of store logs.
///
/// Only the first call has an effect. If another `log` backend was already
/// installed by the host, records keep flowing to that backend instead.
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        log::warn!("relstore logger already set");
        return;
    }

    static LOGGER: ForwardingLogger = ForwardingLogger;
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Trace);
    }
}
