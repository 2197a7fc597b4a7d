//! Bridge from the `log` facade to the host application's logger.
//!
//! The library logs through `log`. Mobile shells register a [`Logger`] with
//! [`set_logger`] so records end up in the platform log (`os_log`, Logcat)
//! next to the rest of the app's output.
//!
//! ```rust
//! use std::sync::Arc;
//! use lskit_core::logger::{set_logger, LogLevel, Logger};
//!
//! struct StderrLogger;
//!
//! impl Logger for StderrLogger {
//!     fn log(&self, level: LogLevel, message: String) {
//!         eprintln!("[{level:?}] {message}");
//!     }
//! }
//!
//! set_logger(Arc::new(StderrLogger));
//! ```
//!
//! Key material is never passed to the logger; keys are referred to by
//! their fingerprint only.

use std::sync::{Arc, OnceLock};

/// Records from targets outside this prefix are only forwarded from `Info` up.
const FORWARDED_TARGET_PREFIX: &str = "lskit";

static HOST_LOGGER: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Receiver of log records, implemented by the host application.
#[cfg_attr(feature = "ffi", uniffi::export(with_foreign))]
pub trait Logger: Sync + Send {
    /// Logs `message` at `level`.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum LogLevel {
    /// Very detailed tracing output.
    Trace,
    /// Debugging information.
    Debug,
    /// Progress of the application.
    Info,
    /// Potentially harmful situations.
    Warn,
    /// Failures.
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

/// `log` backend handing records to [`HOST_LOGGER`].
struct HostLogBridge;

static BRIDGE: HostLogBridge = HostLogBridge;

fn is_forwarded(metadata: &log::Metadata<'_>) -> bool {
    metadata.level() <= log::Level::Info
        || metadata.target().starts_with(FORWARDED_TARGET_PREFIX)
}

impl log::Log for HostLogBridge {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        is_forwarded(metadata)
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        match HOST_LOGGER.get() {
            Some(sink) => sink.log(record.level().into(), message),
            None => eprintln!("[{}] {message}", record.level()),
        }
    }

    fn flush(&self) {}
}

/// Registers the host logger and routes `log` records to it.
///
/// The first registration wins; later calls are ignored with a warning
/// sent to the logger already in place.
#[cfg_attr(feature = "ffi", uniffi::export)]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if HOST_LOGGER.set(logger).is_err() {
        log::warn!("host logger already registered, keeping the first one");
        return;
    }

    match log::set_logger(&BRIDGE) {
        Ok(()) => log::set_max_level(log::LevelFilter::Trace),
        Err(err) => eprintln!("another `log` backend is installed: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(level: log::Level, target: &str) -> log::Metadata<'_> {
        log::Metadata::builder().level(level).target(target).build()
    }

    #[test]
    fn test_level_conversion() {
        assert_eq!(LogLevel::from(log::Level::Error), LogLevel::Error);
        assert_eq!(LogLevel::from(log::Level::Warn), LogLevel::Warn);
        assert_eq!(LogLevel::from(log::Level::Info), LogLevel::Info);
        assert_eq!(LogLevel::from(log::Level::Debug), LogLevel::Debug);
        assert_eq!(LogLevel::from(log::Level::Trace), LogLevel::Trace);
    }

    #[test]
    fn test_forwarding_filter() {
        assert!(is_forwarded(&metadata(log::Level::Debug, "lskit_core::provisioning")));
        assert!(is_forwarded(&metadata(log::Level::Trace, "lskit_core::cache")));
        assert!(is_forwarded(&metadata(log::Level::Info, "hyper::client")));
        assert!(is_forwarded(&metadata(log::Level::Error, "tokio")));
        assert!(!is_forwarded(&metadata(log::Level::Debug, "hyper::client")));
        assert!(!is_forwarded(&metadata(log::Level::Trace, "mio")));
    }
}
