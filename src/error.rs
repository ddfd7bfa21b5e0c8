//! Error handling for the application supervisor.
//!
//! Every failure the supervisor can report is a variant of [`Error`]. Each
//! variant carries an [`ErrorCode`] for programmatic matching, a human-readable
//! message, and an optional source error.
//!
//! # Propagation
//!
//! * Setup-time errors (duplicate names, a second main service, unknown
//!   critical service) are returned synchronously from the registration call.
//! * Background service failures are logged and absorbed unless the service
//!   is critical, in which case they surface from
//!   [`Supervisor::run`](crate::Supervisor::run) as
//!   [`ErrorCode::CriticalServiceFailure`].
//! * Stop timeouts and exit handler failures are logged and collected, never
//!   propagated in a way that aborts teardown.
//!
//! ```no_run
//! use app_supervisor::{Error, ErrorCode, Result};
//!
//! fn check(name: &str) -> Result<()> {
//!     if name.is_empty() {
//!         return Err(Error::config("service name cannot be empty"));
//!     }
//!     Ok(())
//! }
//!
//! let err = Error::duplicate_service("http");
//! assert_eq!(err.code(), ErrorCode::DuplicateService);
//! ```

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed source error carried by every [`Error`] variant.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error code enum for categorizing and identifying errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
pub enum ErrorCode {
    // Configuration errors: 1000-1999
    /// Configuration value failed validation
    ConfigInvalid = 1000,
    /// Configuration source could not be parsed
    ConfigParse = 1001,

    // Signal handling errors: 2000-2999
    /// Signal handler could not be installed
    SignalRegisterFailed = 2000,

    // Shutdown errors: 3000-3999
    /// A service did not stop within the grace period
    ServiceStopTimeout = 3000,

    // Service errors: 4000-4999
    /// A service with the same name is already registered
    DuplicateService = 4000,
    /// A main service has already been designated
    MainServiceAlreadySet = 4001,
    /// The named service was never registered
    ServiceNotRegistered = 4002,
    /// The named service is registered but cannot be run
    ServiceNotRunnable = 4003,
    /// A critical service terminated and forced shutdown
    CriticalServiceFailure = 4004,
    /// A service returned an error from `run`
    ServiceFailed = 4005,
    /// A service panicked while running
    ServicePanicked = 4006,
    /// A service failed to reload
    ReloadFailed = 4007,

    // Exit handler errors: 5000-5999
    /// An exit handler returned an error or panicked
    ExitHandlerFailed = 5000,
    /// Exit handlers were already drained
    ExitHandlersClosed = 5001,

    // IO errors: 6000-6999
    /// Generic I/O failure
    IoError = 6000,

    // State errors: 9000-9999
    /// Operation not allowed in the current lifecycle state
    InvalidStateTransition = 9000,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.as_str(), *self as i32)
    }
}

impl ErrorCode {
    /// Convert error code to string representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::ConfigParse => "CONFIG_PARSE",

            Self::SignalRegisterFailed => "SIGNAL_REGISTER_FAILED",

            Self::ServiceStopTimeout => "SERVICE_STOP_TIMEOUT",

            Self::DuplicateService => "DUPLICATE_SERVICE",
            Self::MainServiceAlreadySet => "MAIN_SERVICE_ALREADY_SET",
            Self::ServiceNotRegistered => "SERVICE_NOT_REGISTERED",
            Self::ServiceNotRunnable => "SERVICE_NOT_RUNNABLE",
            Self::CriticalServiceFailure => "CRITICAL_SERVICE_FAILURE",
            Self::ServiceFailed => "SERVICE_FAILED",
            Self::ServicePanicked => "SERVICE_PANICKED",
            Self::ReloadFailed => "RELOAD_FAILED",

            Self::ExitHandlerFailed => "EXIT_HANDLER_FAILED",
            Self::ExitHandlersClosed => "EXIT_HANDLERS_CLOSED",

            Self::IoError => "IO_ERROR",

            Self::InvalidStateTransition => "INVALID_STATE_TRANSITION",
        }
    }
}

/// Comprehensive error type for all supervisor operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error [{code}]: {message}")]
    Config {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Optional source error for better context
        #[source]
        source: Option<BoxError>,
    },

    /// Signal handling errors
    #[error("Signal handling error [{code}]: {message}")]
    Signal {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Signal number if applicable
        signal: Option<i32>,
        /// Optional source error for better context
        #[source]
        source: Option<BoxError>,
    },

    /// Service registration and runtime errors
    #[error("Service '{name}' error [{code}]: {message}")]
    Service {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Name of the service
        name: String,
        /// Human-readable error message
        message: String,
        /// Optional source error for better context
        #[source]
        source: Option<BoxError>,
    },

    /// Exit handler failures, isolated per handler
    #[error("Exit handler #{index} failed [{code}]: {message}")]
    ExitHandler {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Registration index of the handler (0 = first registered)
        index: usize,
        /// Human-readable error message
        message: String,
        /// Optional source error for better context
        #[source]
        source: Option<BoxError>,
    },

    /// I/O operation errors
    #[error("I/O error [{code}]: {message}")]
    Io {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Optional source error for better context
        #[source]
        source: Option<BoxError>,
    },

    /// Timeout errors
    #[error("Operation timed out [{code}] after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Operation that timed out
        operation: String,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
        /// Optional source error for better context
        #[source]
        source: Option<BoxError>,
    },

    /// Invalid state errors
    #[error("Invalid state [{code}]: {message}")]
    InvalidState {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Current state if applicable
        current_state: Option<String>,
    },
}

impl Error {
    /// Create a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            code: ErrorCode::ConfigInvalid,
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration parse error wrapping its source.
    pub fn config_parse<S: Into<String>, E: Into<BoxError>>(message: S, source: E) -> Self {
        Self::Config {
            code: ErrorCode::ConfigParse,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new signal error with signal number.
    pub fn signal_with_number<S: Into<String>>(message: S, signal: i32) -> Self {
        Self::Signal {
            code: ErrorCode::SignalRegisterFailed,
            message: message.into(),
            signal: Some(signal),
            source: None,
        }
    }

    /// A service with this name is already registered.
    pub fn duplicate_service<S: Into<String>>(name: S) -> Self {
        Self::service_with_code(
            ErrorCode::DuplicateService,
            name,
            "a service with this name is already registered",
        )
    }

    /// A main service is already designated; `name` is the rejected one.
    pub fn main_service_already_set<S: Into<String>, M: AsRef<str>>(name: S, current: M) -> Self {
        Self::service_with_code(
            ErrorCode::MainServiceAlreadySet,
            name,
            format!("main service already set to '{}'", current.as_ref()),
        )
    }

    /// The named service was never registered.
    pub fn service_not_registered<S: Into<String>>(name: S) -> Self {
        Self::service_with_code(
            ErrorCode::ServiceNotRegistered,
            name,
            "service is not registered",
        )
    }

    /// The named service is registered as passive and cannot be run.
    pub fn service_not_runnable<S: Into<String>>(name: S) -> Self {
        Self::service_with_code(
            ErrorCode::ServiceNotRunnable,
            name,
            "service is not runnable",
        )
    }

    /// A service failed with an underlying error.
    pub fn service_failed<S: Into<String>, E: Into<BoxError>>(name: S, source: E) -> Self {
        Self::Service {
            code: ErrorCode::ServiceFailed,
            name: name.into(),
            message: "service failed".to_string(),
            source: Some(source.into()),
        }
    }

    /// A service panicked; `message` is the panic payload when it was a string.
    pub fn service_panicked<S: Into<String>, M: Into<String>>(name: S, message: M) -> Self {
        Self::service_with_code(ErrorCode::ServicePanicked, name, message)
    }

    /// A critical service terminated. `cause` is its error, if it failed.
    pub fn critical_service_failure<S: Into<String>>(name: S, cause: Option<Self>) -> Self {
        let message = match &cause {
            Some(_) => "critical service failed".to_string(),
            None => "critical service exited unexpectedly".to_string(),
        };
        Self::Service {
            code: ErrorCode::CriticalServiceFailure,
            name: name.into(),
            message,
            source: cause.map(|e| Box::new(e) as BoxError),
        }
    }

    /// A service reload failed.
    pub fn reload_failed<S: Into<String>, E: Into<BoxError>>(name: S, source: E) -> Self {
        Self::Service {
            code: ErrorCode::ReloadFailed,
            name: name.into(),
            message: "reload failed".to_string(),
            source: Some(source.into()),
        }
    }

    fn service_with_code<S: Into<String>, M: Into<String>>(
        code: ErrorCode,
        name: S,
        message: M,
    ) -> Self {
        Self::Service {
            code,
            name: name.into(),
            message: message.into(),
            source: None,
        }
    }

    /// An exit handler failed.
    pub fn exit_handler<S: Into<String>>(index: usize, message: S) -> Self {
        Self::ExitHandler {
            code: ErrorCode::ExitHandlerFailed,
            index,
            message: message.into(),
            source: None,
        }
    }

    /// An exit handler returned an error.
    pub fn exit_handler_with_source(index: usize, source: Self) -> Self {
        Self::ExitHandler {
            code: ErrorCode::ExitHandlerFailed,
            index,
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new I/O error with source error.
    pub fn io_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Io {
            code: ErrorCode::IoError,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// A service did not acknowledge stop within the grace period.
    pub fn stop_timeout<S: AsRef<str>>(name: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            code: ErrorCode::ServiceStopTimeout,
            operation: format!("stopping service '{}'", name.as_ref()),
            timeout_ms,
            source: None,
        }
    }

    /// Create a new invalid state error with current state.
    pub fn invalid_state_with_current<S: Into<String>, C: Into<String>>(
        message: S,
        current_state: C,
    ) -> Self {
        Self::InvalidState {
            code: ErrorCode::InvalidStateTransition,
            message: message.into(),
            current_state: Some(current_state.into()),
        }
    }

    /// Exit handlers were already drained.
    pub fn exit_handlers_closed() -> Self {
        Self::InvalidState {
            code: ErrorCode::ExitHandlersClosed,
            message: "exit handlers already drained; teardown has started".to_string(),
            current_state: None,
        }
    }

    /// The error code carried by this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Config { code, .. }
            | Self::Signal { code, .. }
            | Self::Service { code, .. }
            | Self::ExitHandler { code, .. }
            | Self::Io { code, .. }
            | Self::Timeout { code, .. }
            | Self::InvalidState { code, .. } => *code,
        }
    }

    /// Name of the service this error concerns, if any.
    #[must_use]
    pub fn service_name(&self) -> Option<&str> {
        match self {
            Self::Service { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Check if this error is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this error is configuration-related.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Check if this error reports a critical service failure.
    #[must_use]
    pub const fn is_critical_failure(&self) -> bool {
        matches!(
            self,
            Self::Service {
                code: ErrorCode::CriticalServiceFailure,
                ..
            }
        )
    }

    /// Get the error category for logging.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Signal { .. } => "signal",
            Self::Service { .. } => "service",
            Self::ExitHandler { .. } => "exit",
            Self::Io { .. } => "io",
            Self::Timeout { .. } => "timeout",
            Self::InvalidState { .. } => "state",
        }
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::config_parse("Configuration loading failed", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_creation() {
        let err = Error::config("test message");
        assert!(err.is_config_error());
        assert_eq!(err.category(), "config");
        assert_eq!(err.code(), ErrorCode::ConfigInvalid);
    }

    #[test]
    fn test_registration_errors() {
        let err = Error::duplicate_service("http");
        assert_eq!(err.code(), ErrorCode::DuplicateService);
        assert_eq!(err.service_name(), Some("http"));

        let err = Error::main_service_already_set("second", "first");
        assert_eq!(err.code(), ErrorCode::MainServiceAlreadySet);
        assert!(err.to_string().contains("'first'"));

        let err = Error::service_not_registered("ghost");
        assert_eq!(err.code(), ErrorCode::ServiceNotRegistered);
    }

    #[test]
    fn test_critical_failure_keeps_cause() {
        let cause = Error::service_failed("db", std::io::Error::other("connection reset"));
        let err = Error::critical_service_failure("db", Some(cause));
        assert!(err.is_critical_failure());
        let source = err.source().expect("cause is attached");
        assert!(source.to_string().contains("db"));

        let err = Error::critical_service_failure("db", None);
        assert!(err.source().is_none());
        assert!(err.to_string().contains("exited unexpectedly"));
    }

    #[test]
    fn test_timeout_error() {
        let err = Error::stop_timeout("slow", 250);
        assert!(err.is_timeout());
        assert_eq!(err.code(), ErrorCode::ServiceStopTimeout);
        assert_eq!(err.category(), "timeout");
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_panic_and_io_errors() {
        let err = Error::service_panicked("worker", "index out of bounds");
        assert_eq!(err.code(), ErrorCode::ServicePanicked);
        assert_eq!(err.service_name(), Some("worker"));

        let err = Error::io_with_source("flush failed", std::io::Error::other("disk full"));
        assert_eq!(err.code(), ErrorCode::IoError);
        assert_eq!(err.category(), "io");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(
            ErrorCode::MainServiceAlreadySet.to_string(),
            "MAIN_SERVICE_ALREADY_SET(4001)"
        );
    }
}
