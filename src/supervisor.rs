//! The application supervisor.
//!
//! A [`Supervisor`] owns the service registry and runs every service on
//! tasks it spawns itself. Its driver task runs the main service and performs
//! teardown when main returns, a critical service terminates, or shutdown is
//! requested from outside, whether or not anyone is still awaiting `run`.

use arc_swap::ArcSwap;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::exit::{panic_message, ExitCoordinator, ExitReport};
use crate::registry::{BackgroundService, RegisteredService, Registry};
use crate::service::{RunnableService, Service, StopHandle};
use crate::shutdown::{Lifecycle, LifecycleState, ShutdownHandle, ShutdownReason};

/// Outcome of a [`Supervisor::reload`] broadcast.
///
/// Each failure is reported on its own; none of them stops a service.
#[derive(Debug, Default)]
pub struct ReloadReport {
    /// Whether the supervisor configuration was re-read from its source file
    pub config_reloaded: bool,
    /// Error from re-reading the configuration file, if any
    pub config_error: Option<Error>,
    /// Services that reloaded successfully, in registration order
    pub reloaded: Vec<Arc<str>>,
    /// Per-service reload failures
    pub failures: Vec<Error>,
}

impl ReloadReport {
    /// Whether the configuration and every service reloaded without error.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.config_error.is_none() && self.failures.is_empty()
    }
}

struct Inner {
    config: ArcSwap<Config>,
    config_path: Option<PathBuf>,
    registry: RwLock<Registry>,
    lifecycle: Lifecycle,
    exit: ExitCoordinator,
    /// Critical failure that triggered teardown, returned from `run`
    failure: Mutex<Option<Error>>,
}

/// A launched background service.
struct RunningService {
    name: Arc<str>,
    service: Arc<dyn RunnableService>,
    stop: StopHandle,
    task: JoinHandle<()>,
}

/// Requests shutdown if `run` is dropped before its driver finishes.
struct RequestOnDrop<'a>(Option<&'a Lifecycle>);

impl Drop for RequestOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(lifecycle) = self.0.take() {
            if lifecycle.request(ShutdownReason::Requested) {
                warn!("run() dropped before teardown; requesting shutdown");
            }
        }
    }
}

/// Supervises the lifetime of a set of services.
///
/// Cloning is cheap; all clones control the same supervisor, so one clone can
/// be moved into `run()` while others call [`shutdown`](Self::shutdown) or
/// [`reload`](Self::reload).
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("name", &self.config().name)
            .field("state", &self.state())
            .field("registry", &*self.inner.registry.read())
            .field("exit", &self.inner.exit)
            .finish()
    }
}

impl Supervisor {
    /// Create a supervisor with the provided configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::from_parts(config, None)
    }

    /// Create a supervisor builder with the provided configuration.
    #[must_use]
    pub fn builder(config: Config) -> SupervisorBuilder {
        SupervisorBuilder::new(config)
    }

    /// Create a supervisor with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    fn from_parts(config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: ArcSwap::from_pointee(config),
                config_path,
                registry: RwLock::new(Registry::new()),
                lifecycle: Lifecycle::new(),
                exit: ExitCoordinator::new(),
                failure: Mutex::new(None),
            }),
        }
    }

    // --- registration -----------------------------------------------------

    fn with_registry<T>(&self, f: impl FnOnce(&mut Registry) -> Result<T>) -> Result<T> {
        let mut registry = self.inner.registry.write();
        let state = self.inner.lifecycle.state();
        if state != LifecycleState::Setup {
            return Err(Error::invalid_state_with_current(
                "services can only be registered before run()",
                state.to_string(),
            ));
        }
        f(&mut registry)
    }

    /// Register a passive service (reload and inventory only).
    ///
    /// # Errors
    ///
    /// Fails on a duplicate name, or once `run()` has started.
    pub fn register_service<S: Service>(&self, svc: S) -> Result<()> {
        self.with_registry(|r| r.register_service(svc))
    }

    /// Register a background service.
    ///
    /// # Errors
    ///
    /// Fails on a duplicate name, or once `run()` has started.
    pub fn register_runnable<S: RunnableService>(&self, svc: S) -> Result<()> {
        self.with_registry(|r| r.register_runnable(svc))
    }

    /// Register the main service, whose `run` defines the process lifetime.
    ///
    /// # Errors
    ///
    /// Fails if a main service is already set, on a duplicate name, or once
    /// `run()` has started.
    pub fn register_main_service<S: RunnableService>(&self, svc: S) -> Result<()> {
        self.with_registry(|r| r.register_main_service(svc))
    }

    /// Mark a registered runnable service as critical.
    ///
    /// # Errors
    ///
    /// Fails if the service is unknown or passive, or once `run()` has started.
    pub fn set_critical_service(&self, name: &str) -> Result<()> {
        self.with_registry(|r| r.set_critical_service(name))
    }

    /// Register a cleanup callback run once during teardown (LIFO order).
    ///
    /// Handlers run on a blocking thread and may perform blocking I/O.
    ///
    /// # Errors
    ///
    /// Fails once exit handlers have started draining.
    pub fn register_exit_handler<F>(&self, handler: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.exit.register(move || {
            handler();
            Ok(())
        })
    }

    /// Register a cleanup callback whose error is reported during teardown.
    ///
    /// # Errors
    ///
    /// Fails once exit handlers have started draining.
    pub fn register_fallible_exit_handler<F>(&self, handler: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.inner.exit.register(handler)
    }

    // --- accessors --------------------------------------------------------

    /// The main service, if one was registered.
    #[must_use]
    pub fn main_service(&self) -> Option<Arc<dyn RunnableService>> {
        self.inner.registry.read().main_service()
    }

    /// Snapshot of all registered services, in registration order.
    #[must_use]
    pub fn services(&self) -> Vec<RegisteredService> {
        self.inner.registry.read().services()
    }

    /// Whether the named service is marked critical.
    #[must_use]
    pub fn is_critical(&self, name: &str) -> bool {
        self.inner.registry.read().is_critical(name)
    }

    /// Current configuration snapshot; reflects the latest successful reload.
    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        self.inner.config.load_full()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.inner.lifecycle.state()
    }

    /// Whether the shutdown signal has fired. Never reverts to false.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.lifecycle.is_fired()
    }

    /// Whether `run()` is active and no shutdown has been requested.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running && !self.inner.lifecycle.is_requested()
    }

    /// Why teardown started, once it has been requested.
    #[must_use]
    pub fn shutdown_reason(&self) -> Option<ShutdownReason> {
        self.inner.lifecycle.reason()
    }

    /// A waiter for teardown completion that does not request shutdown.
    #[must_use]
    pub fn termination_handle(&self) -> ShutdownHandle {
        self.inner.lifecycle.handle()
    }

    // --- control ----------------------------------------------------------

    /// Request shutdown and return a handle resolving when teardown completes.
    ///
    /// Idempotent: repeated or concurrent calls never re-trigger teardown.
    /// Requested before `run()`, the request is kept and `run()` goes straight
    /// to teardown.
    pub fn shutdown(&self) -> ShutdownHandle {
        self.shutdown_with_reason(ShutdownReason::Requested)
    }

    /// Like [`shutdown`](Self::shutdown) with an explicit reason.
    pub fn shutdown_with_reason(&self, reason: ShutdownReason) -> ShutdownHandle {
        self.inner.lifecycle.request(reason);
        self.inner.lifecycle.handle()
    }

    /// Re-read configuration and broadcast reload to every reloadable service.
    ///
    /// Reload never changes the lifecycle state. Failures are logged and
    /// reported per service.
    ///
    /// # Errors
    ///
    /// Fails only when called after termination.
    #[instrument(skip(self), fields(app = %self.config().name))]
    pub async fn reload(&self) -> Result<ReloadReport> {
        let state = self.state();
        if state == LifecycleState::Terminated {
            return Err(Error::invalid_state_with_current(
                "cannot reload after termination",
                state.to_string(),
            ));
        }

        info!("Reloading configuration and services");
        let mut report = ReloadReport::default();

        if let Some(path) = &self.inner.config_path {
            match Config::load_from_file(path) {
                Ok(config) => {
                    self.inner.config.store(Arc::new(config));
                    report.config_reloaded = true;
                    info!(path = %path.display(), "Configuration reloaded");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Configuration reload failed; keeping previous configuration");
                    report.config_error = Some(e);
                }
            }
        }

        let services = self.services();
        for svc in &services {
            let Some(reloadable) = svc.service.as_reloadable() else {
                continue;
            };
            match reloadable.reload().await {
                Ok(()) => {
                    debug!(service = %svc.name, "Service reloaded");
                    report.reloaded.push(Arc::clone(&svc.name));
                }
                Err(e) => {
                    let err = Error::reload_failed(svc.name.as_ref(), e);
                    warn!(service = %svc.name, error = %err, "Service reload failed");
                    report.failures.push(err);
                }
            }
        }

        info!(
            reloaded = report.reloaded.len(),
            failed = report.failures.len(),
            "Reload complete"
        );
        Ok(report)
    }

    /// Log the effective configuration and registered services.
    pub fn output_env(&self) {
        let config = self.config();
        info!(
            app = %config.name,
            version = crate::VERSION,
            state = %self.state(),
            grace_period_ms = config.shutdown.grace_period_ms,
            log_level = ?config.logging.level,
            json_logs = config.logging.json,
            shutdown_signals = config.signals.shutdown,
            reload_signal = config.signals.reload,
            "Application environment"
        );
        if let Some(path) = &self.inner.config_path {
            info!(path = %path.display(), "Configuration source");
        }
        for svc in self.services() {
            info!(
                service = %svc.name,
                role = %svc.role,
                reloadable = svc.service.as_reloadable().is_some(),
                "Registered service"
            );
        }
        debug!(exit_handlers = self.inner.exit.pending(), "Pending exit handlers");
    }

    // --- run --------------------------------------------------------------

    /// Run all services until teardown completes.
    ///
    /// Background services are launched first, then the main service runs on
    /// a supervisor-owned driver task. Without a main service, the driver
    /// waits for a shutdown request. Teardown stops background services
    /// (bounded by the grace period), fires the shutdown signal and drains the
    /// exit handlers before `run` returns.
    ///
    /// Dropping the returned future requests a graceful shutdown; the driver
    /// still finishes teardown on its own and
    /// [`termination_handle`](Self::termination_handle) resolves once it has.
    ///
    /// # Errors
    ///
    /// * `InvalidState` if `run` was already called.
    /// * `CriticalServiceFailure` if a critical service caused the shutdown.
    /// * The main service's own error otherwise.
    #[instrument(skip(self), fields(app = %self.config().name))]
    pub async fn run(&self) -> Result<()> {
        let inner = &self.inner;
        if !inner
            .lifecycle
            .transition(LifecycleState::Setup, LifecycleState::Running)
        {
            return Err(Error::invalid_state_with_current(
                "run() may only be called once",
                self.state().to_string(),
            ));
        }

        let mut on_drop = RequestOnDrop(Some(&inner.lifecycle));
        let driver = tokio::spawn(self.clone().drive().in_current_span());
        let joined = driver.await;
        on_drop.0 = None;

        let main_result = match joined {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Supervisor driver task failed");
                return Err(Error::service_panicked("supervisor", e.to_string()));
            }
        };
        let failure = inner.failure.lock().take();
        match failure {
            Some(err) => Err(err),
            None => main_result,
        }
    }

    /// Launch, main, teardown. Returns the main service's result.
    async fn drive(self) -> Result<()> {
        let inner = &self.inner;
        let started = Instant::now();
        let (main, background) = {
            let registry = inner.registry.read();
            let main = registry
                .main_service()
                .zip(registry.main_service_name().map(Arc::<str>::from));
            (main, registry.background())
        };
        info!(
            main = ?main.as_ref().map(|(_, name)| name),
            background = background.len(),
            "Starting supervisor"
        );

        let mut running = Vec::with_capacity(background.len());
        let main_result = if inner.lifecycle.is_requested() {
            info!("Shutdown requested before start; skipping service launch");
            Ok(())
        } else {
            for svc in background {
                running.push(self.launch(svc));
            }
            match main {
                Some((svc, name)) => self.run_main(name, svc).await,
                None => {
                    info!("No main service registered; waiting for shutdown request");
                    inner.lifecycle.requested_token().cancelled().await;
                    Ok(())
                }
            }
        };

        self.teardown(running, started).await;
        main_result
    }

    async fn run_main(&self, name: Arc<str>, svc: Arc<dyn RunnableService>) -> Result<()> {
        let lifecycle = &self.inner.lifecycle;
        let stop = StopHandle::new(Arc::clone(&name), CancellationToken::new());
        let fut = AssertUnwindSafe(svc.run(stop.clone())).catch_unwind();
        tokio::pin!(fut);

        info!(service = %name, "Running main service");
        let outcome = tokio::select! {
            outcome = &mut fut => outcome,
            () = lifecycle.requested_token().cancelled() => {
                info!(service = %name, "Stopping main service");
                stop.request_stop(lifecycle.reason());
                call_stop_hook(&name, svc.as_ref());
                let grace = self.grace_period();
                if let Ok(outcome) = tokio::time::timeout(grace, &mut fut).await {
                    outcome
                } else {
                    let err = Error::stop_timeout(name.as_ref(), millis(grace));
                    warn!(service = %name, error = %err, "Main service did not stop within grace period; abandoning");
                    return Ok(());
                }
            }
        };

        let result = match outcome {
            Ok(result) => result,
            Err(panic) => Err(Error::service_panicked(
                name.as_ref(),
                panic_message(panic.as_ref()),
            )),
        };
        match &result {
            Ok(()) => {
                info!(service = %name, "Main service exited");
                lifecycle.request(ShutdownReason::MainServiceExited);
            }
            Err(e) => {
                error!(service = %name, error = %e, "Main service failed");
                lifecycle.request(ShutdownReason::MainServiceFailed);
            }
        }
        result
    }

    fn launch(&self, bg: BackgroundService) -> RunningService {
        let BackgroundService {
            name,
            service,
            critical,
        } = bg;
        let stop = StopHandle::new(Arc::clone(&name), CancellationToken::new());
        let fut = AssertUnwindSafe(service.run(stop.clone())).catch_unwind();

        let inner = Arc::clone(&self.inner);
        let task_name = Arc::clone(&name);
        let task = tokio::spawn(async move {
            let outcome = match fut.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(panic) => Some(Error::service_panicked(
                    task_name.as_ref(),
                    panic_message(panic.as_ref()),
                )),
            };
            inner.on_service_exit(&task_name, critical, outcome);
        });

        info!(service = %name, critical, "Started background service");
        RunningService {
            name,
            service,
            stop,
            task,
        }
    }

    async fn teardown(&self, running: Vec<RunningService>, started: Instant) {
        let inner = &self.inner;
        inner
            .lifecycle
            .transition(LifecycleState::Running, LifecycleState::ShuttingDown);
        info!(reason = ?inner.lifecycle.reason(), "Beginning graceful shutdown");

        let abandoned = self.stop_background(running).await;

        inner.lifecycle.fire();
        let draining = Arc::clone(inner);
        let report = tokio::task::spawn_blocking(move || draining.exit.drain())
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "Exit handler task failed");
                ExitReport::default()
            });
        inner
            .lifecycle
            .transition(LifecycleState::ShuttingDown, LifecycleState::Terminated);

        if !report.is_clean() {
            warn!(
                failed = report.failures.len(),
                "Some exit handlers failed during teardown"
            );
        }
        info!(
            uptime = ?started.elapsed(),
            abandoned = abandoned.len(),
            exit_handlers = report.invoked,
            exit_handler_failures = report.failures.len(),
            "Supervisor shutdown complete"
        );
    }

    /// Ask every background service to stop and wait for them, sharing one
    /// grace-period deadline. Returns the names of abandoned services.
    async fn stop_background(&self, running: Vec<RunningService>) -> Vec<Arc<str>> {
        if running.is_empty() {
            return Vec::new();
        }

        let grace = self.grace_period();
        let reason = self.inner.lifecycle.reason();
        info!(count = running.len(), grace = ?grace, "Stopping background services");
        for svc in &running {
            svc.stop.request_stop(reason.clone());
            call_stop_hook(&svc.name, svc.service.as_ref());
        }

        let deadline = tokio::time::Instant::now() + grace;
        let waits = running.into_iter().map(|svc| async move {
            match tokio::time::timeout_at(deadline, svc.task).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => {
                    error!(service = %svc.name, error = %e, "Background service task failed");
                    None
                }
                Err(_) => {
                    let err = Error::stop_timeout(svc.name.as_ref(), millis(grace));
                    warn!(service = %svc.name, error = %err, "Service did not stop within grace period; abandoning");
                    Some(svc.name)
                }
            }
        });

        futures::future::join_all(waits)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    fn grace_period(&self) -> Duration {
        self.config().grace_period()
    }
}

impl Inner {
    fn on_service_exit(&self, name: &Arc<str>, critical: bool, outcome: Option<Error>) {
        if critical && !self.lifecycle.is_requested() {
            // Store the failure under the lock so `run` cannot observe the
            // shutdown request without it.
            let mut failure = self.failure.lock();
            let err = Error::critical_service_failure(name.as_ref(), outcome);
            error!(service = %name, error = %err, "Critical service terminated; shutting down");
            if self
                .lifecycle
                .request(ShutdownReason::CriticalService(name.to_string()))
            {
                *failure = Some(err);
            }
            return;
        }

        match outcome {
            Some(e) => error!(service = %name, critical, error = %e, "Background service failed"),
            None => info!(service = %name, "Background service exited"),
        }
    }
}

fn call_stop_hook(name: &str, svc: &dyn RunnableService) {
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| svc.stop())) {
        warn!(service = %name, panic = %panic_message(panic.as_ref()), "Stop hook panicked");
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Builder for creating supervisors with a fluent API.
///
/// Registration errors are deferred to [`build`](Self::build).
pub struct SupervisorBuilder {
    config: Config,
    config_path: Option<PathBuf>,
    registrations: Vec<Registration>,
}

type Registration = Box<dyn FnOnce(&Supervisor) -> Result<()> + Send + 'static>;

impl std::fmt::Debug for SupervisorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorBuilder")
            .field("config", &self.config)
            .field("config_path", &self.config_path)
            .field("registrations", &self.registrations.len())
            .finish()
    }
}

impl SupervisorBuilder {
    /// Create a new builder with the provided configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            config_path: None,
            registrations: Vec::with_capacity(8),
        }
    }

    /// Configuration file re-read on every [`Supervisor::reload`].
    #[must_use]
    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Override the configured teardown grace period.
    #[must_use]
    pub fn with_grace_period(mut self, period: Duration) -> Self {
        self.config.shutdown.grace_period_ms = millis(period);
        self
    }

    fn push(mut self, f: impl FnOnce(&Supervisor) -> Result<()> + Send + 'static) -> Self {
        self.registrations.push(Box::new(f));
        self
    }

    /// Register the main service.
    #[must_use]
    pub fn with_main_service<S: RunnableService>(self, svc: S) -> Self {
        self.push(move |sup| sup.register_main_service(svc))
    }

    /// Register a passive service.
    #[must_use]
    pub fn with_service<S: Service>(self, svc: S) -> Self {
        self.push(move |sup| sup.register_service(svc))
    }

    /// Register a background service.
    #[must_use]
    pub fn with_runnable<S: RunnableService>(self, svc: S) -> Self {
        self.push(move |sup| sup.register_runnable(svc))
    }

    /// Register a background service and mark it critical.
    #[must_use]
    pub fn with_critical_service<S: RunnableService>(self, svc: S) -> Self {
        self.push(move |sup| {
            let name = svc.name().to_string();
            sup.register_runnable(svc)?;
            sup.set_critical_service(&name)
        })
    }

    /// Register an exit handler.
    #[must_use]
    pub fn with_exit_handler<F>(self, handler: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(move |sup| sup.register_exit_handler(handler))
    }

    /// Build the supervisor.
    ///
    /// # Errors
    ///
    /// Returns the first configuration or registration error.
    pub fn build(self) -> Result<Supervisor> {
        self.config.validate()?;
        let supervisor = Supervisor::from_parts(self.config, self.config_path);
        for register in self.registrations {
            register(&supervisor)?;
        }
        debug!(
            services = supervisor.services().len(),
            "Supervisor built"
        );
        Ok(supervisor)
    }

    /// Build and run the supervisor in one step.
    ///
    /// # Errors
    ///
    /// Returns build errors, or whatever [`Supervisor::run`] returns.
    pub async fn run(self) -> Result<()> {
        self.build()?.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::service::service_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config() -> Config {
        Config::builder()
            .name("test-app")
            .grace_period(Duration::from_millis(200))
            .unwrap()
            .build()
            .unwrap()
    }

    fn until_stopped(name: &'static str) -> impl RunnableService {
        service_fn(name, |stop: StopHandle| async move {
            stop.stopped().await;
            Ok(())
        })
    }

    #[test]
    fn test_registration_closed_after_run_starts() {
        let sup = Supervisor::new(test_config());
        sup.register_runnable(until_stopped("a")).unwrap();
        assert!(sup
            .inner
            .lifecycle
            .transition(LifecycleState::Setup, LifecycleState::Running));

        let err = sup.register_runnable(until_stopped("b")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStateTransition);
        assert_eq!(sup.services().len(), 1);
    }

    #[test]
    fn test_builder_surfaces_registration_errors() {
        let err = Supervisor::builder(test_config())
            .with_main_service(until_stopped("http"))
            .with_main_service(until_stopped("grpc"))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MainServiceAlreadySet);

        let sup = Supervisor::builder(test_config())
            .with_main_service(until_stopped("http"))
            .with_critical_service(until_stopped("queue"))
            .with_grace_period(Duration::from_millis(50))
            .build()
            .unwrap();
        assert!(sup.is_critical("queue"));
        assert_eq!(sup.main_service().unwrap().name(), "http");
        assert_eq!(sup.config().shutdown.grace_period_ms, 50);
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let test_result = tokio::time::timeout(Duration::from_secs(5), async {
            let sup = Supervisor::new(test_config());
            sup.register_main_service(service_fn("once", |_stop: StopHandle| async { Ok(()) }))
                .unwrap();

            sup.run().await.unwrap();
            let err = sup.run().await.unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidStateTransition);
            assert_eq!(sup.state(), LifecycleState::Terminated);
        })
        .await;

        assert!(test_result.is_ok(), "Test timed out after 5 seconds");
    }

    #[tokio::test]
    async fn test_shutdown_before_run_skips_launch() {
        let test_result = tokio::time::timeout(Duration::from_secs(5), async {
            let launched = Arc::new(AtomicUsize::new(0));
            let sup = Supervisor::new(test_config());
            let counter = Arc::clone(&launched);
            sup.register_main_service(service_fn("main", move |_stop: StopHandle| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }))
            .unwrap();

            let handle = sup.shutdown();
            assert!(!handle.is_complete());
            assert_eq!(sup.state(), LifecycleState::Setup);

            sup.run().await.unwrap();
            handle.await;
            assert_eq!(launched.load(Ordering::SeqCst), 0);
            assert!(sup.is_shutdown());
            assert_eq!(sup.shutdown_reason(), Some(ShutdownReason::Requested));
        })
        .await;

        assert!(test_result.is_ok(), "Test timed out after 5 seconds");
    }

    #[tokio::test]
    async fn test_headless_run_waits_for_shutdown() {
        let test_result = tokio::time::timeout(Duration::from_secs(5), async {
            let sup = Supervisor::new(test_config());
            sup.register_runnable(until_stopped("worker")).unwrap();

            let runner = tokio::spawn({
                let sup = sup.clone();
                async move { sup.run().await }
            });
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(sup.is_running());
            assert!(!sup.is_shutdown());

            sup.shutdown().await;
            runner.await.unwrap().unwrap();
            assert!(sup.is_shutdown());
            assert!(!sup.is_running());
        })
        .await;

        assert!(test_result.is_ok(), "Test timed out after 5 seconds");
    }
}
