#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
//! # app-supervisor: Application Service Supervisor
//!
//! Supervises the lifetime of a long-running process: one main service that
//! defines the process lifetime, any number of background services, and
//! reload-only passive services.
//!
//! ## Key Features
//!
//! - **Main Service**: `run()` blocks on the main service; when it returns,
//!   every other service is stopped
//! - **Critical Services**: a critical background service terminating tears
//!   the whole process down
//! - **Graceful Shutdown**: bounded by a grace period, after which stubborn
//!   services are abandoned
//! - **Exit Handlers**: cleanup callbacks run once, last registered first
//! - **Reload**: broadcast to every service that opts in, plus a config re-read
//! - **Signal Handling**: optional listener mapping SIGHUP to reload and
//!   SIGTERM/SIGINT/SIGQUIT to shutdown
//! - **Configuration**: layered defaults, TOML file and `APP_` environment
//!   variables via `figment`
//! - **Structured Logging**: `tracing` with optional JSON output
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use app_supervisor::{service_fn, Config, Result, SignalListener, StopHandle, Supervisor};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     app_supervisor::logging::init(&config.logging)?;
//!
//!     let supervisor = Supervisor::builder(config)
//!         .with_main_service(service_fn("http", |stop: StopHandle| async move {
//!             stop.stopped().await;
//!             Ok(())
//!         }))
//!         .with_critical_service(service_fn("queue", |stop: StopHandle| async move {
//!             loop {
//!                 tokio::select! {
//!                     () = stop.stopped() => return Ok(()),
//!                     () = tokio::time::sleep(Duration::from_secs(1)) => {}
//!                 }
//!             }
//!         }))
//!         .with_exit_handler(|| tracing::info!("flushed"))
//!         .build()?;
//!
//!     let _signals = SignalListener::new(supervisor.clone()).spawn();
//!     supervisor.run().await
//! }
//! ```

// Private modules
mod config;
mod error;
mod exit;
mod registry;
mod supervisor;

// Public modules
pub mod logging;
pub mod service;
pub mod shutdown;
pub mod signal;

// Public exports
pub use config::{Config, ConfigBuilder, LogConfig, LogLevel, ShutdownConfig, SignalSettings};
pub use error::{BoxError, Error, ErrorCode, Result};
pub use registry::{RegisteredService, Registry};
pub use service::{
    service_fn, FnService, Reloadable, RunnableService, Service, ServiceFuture, ServiceRole,
    StopHandle,
};
pub use shutdown::{LifecycleState, ShutdownHandle, ShutdownReason};
pub use signal::{SignalConfig, SignalListener};
pub use supervisor::{ReloadReport, Supervisor, SupervisorBuilder};

/// Version of the app-supervisor library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default teardown grace period in milliseconds
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 5000;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "app.toml";

/// Prefix of environment variables overriding configuration
pub const ENV_PREFIX: &str = "APP_";
