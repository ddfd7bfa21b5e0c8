//! Cross-platform signal listener.
//!
//! [`SignalListener`] runs as its own task and turns OS signals into calls on
//! the public [`Supervisor`] API. The supervisor never touches signals itself.
//!
//! | Signal | Action |
//! |--------|--------|
//! | `SIGTERM`, `SIGINT`, `SIGQUIT` | `shutdown_with_reason(Signal(n))` |
//! | `SIGHUP` | `reload()` |
//! | Ctrl-C, Ctrl-Break (Windows) | `shutdown_with_reason(Signal(n))` |
//!
//! The listener returns once the supervisor has terminated.

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SignalSettings;
use crate::error::{Error, Result};
use crate::shutdown::ShutdownReason;
use crate::supervisor::Supervisor;

/// Hangup; triggers reload.
pub const SIGHUP: i32 = 1;
/// Interrupt (Ctrl+C).
pub const SIGINT: i32 = 2;
/// Quit.
pub const SIGQUIT: i32 = 3;
/// Terminate.
pub const SIGTERM: i32 = 15;
/// Ctrl+Break on Windows.
pub const SIGBREAK: i32 = 21;

/// Helper function to get a human-readable description of a signal.
#[must_use]
pub const fn signal_description(signal: i32) -> &'static str {
    match signal {
        SIGHUP => "SIGHUP (Hangup)",
        SIGINT => "SIGINT (Interrupt/Ctrl+C)",
        SIGQUIT => "SIGQUIT (Quit)",
        6 => "SIGABRT (Abort)",
        9 => "SIGKILL (Kill - non-catchable)",
        SIGTERM => "SIGTERM (Terminate)",
        SIGBREAK => "SIGBREAK (Ctrl+Break)",
        _ => "Unknown signal",
    }
}

/// Which signals the listener handles.
///
/// A disabled signal is never registered, so it keeps its default OS action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalConfig {
    /// SIGTERM (Ctrl-Break on Windows) triggers shutdown
    pub term: bool,
    /// SIGINT / Ctrl-C triggers shutdown
    pub interrupt: bool,
    /// SIGQUIT triggers shutdown
    pub quit: bool,
    /// SIGHUP triggers reload
    pub hangup: bool,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self::from(&SignalSettings::default())
    }
}

impl From<&SignalSettings> for SignalConfig {
    fn from(settings: &SignalSettings) -> Self {
        Self {
            term: settings.shutdown,
            interrupt: settings.shutdown,
            quit: settings.shutdown,
            hangup: settings.reload,
        }
    }
}

impl SignalConfig {
    /// Create a new signal configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable SIGHUP reload handling.
    #[must_use]
    pub const fn without_sighup(mut self) -> Self {
        self.hangup = false;
        self
    }

    /// Disable SIGINT handling.
    #[must_use]
    pub const fn without_sigint(mut self) -> Self {
        self.interrupt = false;
        self
    }

    /// Disable SIGTERM handling.
    #[must_use]
    pub const fn without_sigterm(mut self) -> Self {
        self.term = false;
        self
    }

    /// Disable SIGQUIT handling.
    #[must_use]
    pub const fn without_sigquit(mut self) -> Self {
        self.quit = false;
        self
    }

    /// Whether no signal is handled at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !(self.term || self.interrupt || self.quit || self.hangup)
    }
}

/// Task translating OS signals into supervisor reload and shutdown calls.
#[derive(Debug)]
pub struct SignalListener {
    supervisor: Supervisor,
    config: SignalConfig,
}

impl SignalListener {
    /// Create a listener using the supervisor's configured signal settings.
    #[must_use]
    pub fn new(supervisor: Supervisor) -> Self {
        let config = SignalConfig::from(&supervisor.config().signals);
        Self { supervisor, config }
    }

    /// Create a listener with an explicit signal configuration.
    #[must_use]
    pub const fn with_config(supervisor: Supervisor, config: SignalConfig) -> Self {
        Self { supervisor, config }
    }

    /// Signals this listener handles.
    #[must_use]
    pub const fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Spawn the listener on the current tokio runtime.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.listen())
    }

    /// Listen for signals until the supervisor terminates.
    ///
    /// # Errors
    ///
    /// Returns an error if a signal handler cannot be registered.
    pub async fn listen(self) -> Result<()> {
        if self.config.is_empty() {
            debug!("No signals enabled; waiting for supervisor termination");
            self.supervisor.termination_handle().wait().await;
            return Ok(());
        }

        #[cfg(unix)]
        {
            self.listen_unix().await
        }

        #[cfg(windows)]
        {
            self.listen_windows().await
        }
    }

    fn on_shutdown_signal(&self, signal: i32) {
        let description = signal_description(signal);
        if self.supervisor.shutdown_reason().is_some() {
            warn!(signal = description, "Shutdown already in progress");
        } else {
            info!(signal = description, "Received signal, initiating graceful shutdown");
        }
        self.supervisor
            .shutdown_with_reason(ShutdownReason::Signal(signal));
    }

    #[cfg(unix)]
    async fn on_reload_signal(&self) {
        info!("Received SIGHUP, reloading");
        match self.supervisor.reload().await {
            Ok(report) if report.is_clean() => {
                info!(reloaded = report.reloaded.len(), "Reload succeeded");
            }
            Ok(report) => warn!(
                reloaded = report.reloaded.len(),
                failed = report.failures.len(),
                config_error = report.config_error.is_some(),
                "Reload completed with failures"
            ),
            Err(e) => warn!(error = %e, "Reload rejected"),
        }
    }
}

#[cfg(unix)]
impl SignalListener {
    async fn listen_unix(&self) -> Result<()> {
        use tokio::signal::unix::{signal, Signal, SignalKind};

        fn register(enabled: bool, kind: SignalKind, number: i32) -> Result<Option<Signal>> {
            if !enabled {
                return Ok(None);
            }
            signal(kind).map(Some).map_err(|e| {
                Error::signal_with_number(
                    format!(
                        "Failed to register {} handler: {e}",
                        signal_description(number)
                    ),
                    number,
                )
            })
        }

        async fn recv(signal: &mut Option<Signal>) -> Option<()> {
            match signal {
                Some(signal) => signal.recv().await,
                None => std::future::pending().await,
            }
        }

        let mut sigterm = register(self.config.term, SignalKind::terminate(), SIGTERM)?;
        let mut sigint = register(self.config.interrupt, SignalKind::interrupt(), SIGINT)?;
        let mut sigquit = register(self.config.quit, SignalKind::quit(), SIGQUIT)?;
        let mut sighup = register(self.config.hangup, SignalKind::hangup(), SIGHUP)?;

        info!(
            term = self.config.term,
            interrupt = self.config.interrupt,
            quit = self.config.quit,
            hangup = self.config.hangup,
            "Unix signal handlers registered"
        );

        let done = self.supervisor.termination_handle();
        loop {
            tokio::select! {
                () = done.wait() => break,
                Some(()) = recv(&mut sigterm) => self.on_shutdown_signal(SIGTERM),
                Some(()) = recv(&mut sigint) => self.on_shutdown_signal(SIGINT),
                Some(()) = recv(&mut sigquit) => self.on_shutdown_signal(SIGQUIT),
                Some(()) = recv(&mut sighup) => self.on_reload_signal().await,
            }
        }

        debug!("Supervisor terminated, signal listener exiting");
        Ok(())
    }
}

#[cfg(windows)]
impl SignalListener {
    async fn listen_windows(&self) -> Result<()> {
        use tokio::signal::windows::{ctrl_break, ctrl_c};

        let mut ctrl_c = if self.config.interrupt {
            Some(ctrl_c().map_err(|e| {
                Error::signal_with_number(format!("Failed to register Ctrl+C handler: {e}"), SIGINT)
            })?)
        } else {
            None
        };
        let mut ctrl_break = if self.config.term {
            Some(ctrl_break().map_err(|e| {
                Error::signal_with_number(
                    format!("Failed to register Ctrl+Break handler: {e}"),
                    SIGBREAK,
                )
            })?)
        } else {
            None
        };

        info!("Windows console handlers registered");

        let done = self.supervisor.termination_handle();
        loop {
            tokio::select! {
                () = done.wait() => break,
                Some(()) = async {
                    match &mut ctrl_c {
                        Some(s) => s.recv().await,
                        None => std::future::pending().await,
                    }
                } => self.on_shutdown_signal(SIGINT),
                Some(()) = async {
                    match &mut ctrl_break {
                        Some(s) => s.recv().await,
                        None => std::future::pending().await,
                    }
                } => self.on_shutdown_signal(SIGBREAK),
            }
        }

        debug!("Supervisor terminated, signal listener exiting");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::service::{service_fn, StopHandle};
    use std::time::Duration;

    #[test]
    fn test_signal_description() {
        assert_eq!(signal_description(SIGTERM), "SIGTERM (Terminate)");
        assert_eq!(signal_description(SIGINT), "SIGINT (Interrupt/Ctrl+C)");
        assert_eq!(signal_description(999), "Unknown signal");
    }

    #[test]
    fn test_signal_config_from_settings() {
        let config = SignalConfig::default();
        assert!(config.term && config.interrupt && config.quit && config.hangup);

        let settings = SignalSettings {
            shutdown: true,
            reload: false,
        };
        let config = SignalConfig::from(&settings);
        assert!(config.term);
        assert!(!config.hangup);

        let config = SignalConfig::new()
            .without_sigterm()
            .without_sigint()
            .without_sigquit()
            .without_sighup();
        assert!(config.is_empty());
    }

    #[test]
    fn test_listener_uses_supervisor_settings() {
        let config = Config::builder().reload_signal(false).build().unwrap();
        let listener = SignalListener::new(Supervisor::new(config));
        assert!(!listener.config().hangup);
        assert!(listener.config().term);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore)]
    async fn test_listener_exits_when_supervisor_terminates() {
        let test_result = tokio::time::timeout(Duration::from_secs(5), async {
            let sup = Supervisor::new(Config::default());
            sup.register_main_service(service_fn("main", |stop: StopHandle| async move {
                stop.stopped().await;
                Ok(())
            }))
            .unwrap();

            let listener = SignalListener::new(sup.clone()).spawn();
            let runner = tokio::spawn({
                let sup = sup.clone();
                async move { sup.run().await }
            });

            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(!listener.is_finished());

            sup.shutdown().await;
            runner.await.unwrap().unwrap();
            listener.await.unwrap().unwrap();
        })
        .await;

        assert!(test_result.is_ok(), "Test timed out after 5 seconds");
    }
}
