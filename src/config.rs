//! Configuration management for the supervisor.
//!
//! Settings are layered with `figment`, from lowest to highest precedence:
//!
//! 1. Built-in defaults
//! 2. Configuration file (TOML, when the `toml` feature is enabled)
//! 3. Environment variables prefixed with `APP_` (nested keys split on `__`,
//!    e.g. `APP_SHUTDOWN__GRACE_PERIOD_MS=2000`)

#[cfg(feature = "toml")]
use figment::providers::Format;
use figment::providers::{Env, Serialized};
use figment::{Figment, Provider};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level logging (most verbose)
    Trace,
    /// Debug level logging
    Debug,
    /// Info level logging (default)
    #[default]
    Info,
    /// Warning level logging
    Warn,
    /// Error level logging
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Logging level
    pub level: LogLevel,
    /// Enable JSON formatted logs
    pub json: bool,
    /// Enable colored output (ignored for JSON logs)
    pub color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: false,
            color: true,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long each teardown phase waits for services to stop, in milliseconds
    pub grace_period_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: crate::DEFAULT_GRACE_PERIOD_MS,
        }
    }
}

/// Which process signals the signal listener reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSettings {
    /// SIGTERM / SIGINT / SIGQUIT (Ctrl-C / Ctrl-Break on Windows) trigger shutdown
    pub shutdown: bool,
    /// SIGHUP triggers reload (Unix only)
    pub reload: bool,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            shutdown: true,
            reload: true,
        }
    }
}

/// Main supervisor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name, used in logs
    pub name: String,
    /// Logging configuration
    pub logging: LogConfig,
    /// Shutdown configuration
    pub shutdown: ShutdownConfig,
    /// Signal configuration
    pub signals: SignalSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: String::from("app"),
            logging: LogConfig::default(),
            shutdown: ShutdownConfig::default(),
            signals: SignalSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default file (`app.toml`) and environment.
    ///
    /// # Errors
    ///
    /// Will return an error if a source contains invalid configuration data.
    pub fn load() -> Result<Self> {
        Self::load_from_file(crate::DEFAULT_CONFIG_FILE)
    }

    /// Load config from a file, falling back to defaults when it is missing.
    ///
    /// # Errors
    ///
    /// Will return an error if the file cannot be parsed or the result is invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        #[allow(unused_mut)]
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        #[cfg(feature = "toml")]
        if path.exists() {
            figment = figment.merge(figment::providers::Toml::file(path));
        }

        #[cfg(not(feature = "toml"))]
        if path.exists() {
            tracing::warn!(path = %path.display(), "Config file ignored: `toml` feature disabled");
        }

        let config: Self = figment.merge(Self::env_provider()).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load config using an extra provider merged on top of the environment.
    ///
    /// # Errors
    ///
    /// Will return an error if the provider fails to load a valid configuration.
    pub fn load_with_provider<P: Provider>(provider: P) -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Self::env_provider())
            .merge(provider)
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn env_provider() -> Env {
        Env::prefixed(crate::ENV_PREFIX).split("__")
    }

    /// Get the teardown grace period as a Duration.
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_millis(self.shutdown.grace_period_ms)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Will return an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.shutdown.grace_period_ms == 0 {
            return Err(Error::config("Shutdown grace period must be greater than 0"));
        }

        if self.name.trim().is_empty() {
            return Err(Error::config("Application name cannot be empty"));
        }

        Ok(())
    }

    /// Check if JSON logging is enabled.
    #[must_use]
    pub const fn is_json_logging(&self) -> bool {
        self.logging.json
    }

    /// Check if colored logging is enabled.
    #[must_use]
    pub const fn is_colored_logging(&self) -> bool {
        self.logging.color && !self.logging.json
    }

    /// Create a builder for this configuration.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for creating configurations programmatically.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    #[must_use]
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the log level.
    #[must_use]
    pub const fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Enable JSON logging.
    #[must_use]
    pub const fn json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    /// Set the teardown grace period.
    ///
    /// # Errors
    ///
    /// Will return an error if the duration exceeds `u64::MAX` milliseconds.
    pub fn grace_period(mut self, period: Duration) -> Result<Self> {
        self.config.shutdown.grace_period_ms = u64::try_from(period.as_millis())
            .map_err(|_| Error::config("Grace period too large"))?;
        Ok(self)
    }

    /// Enable or disable signal-triggered shutdown.
    #[must_use]
    pub const fn shutdown_signals(mut self, enabled: bool) -> Self {
        self.config.signals.shutdown = enabled;
        self
    }

    /// Enable or disable SIGHUP-triggered reload.
    #[must_use]
    pub const fn reload_signal(mut self, enabled: bool) -> Self {
        self.config.signals.reload = enabled;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Will return an error if validation fails.
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
