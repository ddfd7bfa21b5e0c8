//! Service contracts understood by the supervisor.
//!
//! * [`Service`] is the minimal contract: a name, plus an optional reload
//!   capability. Passive services (connection pools, caches) only need this.
//! * [`RunnableService`] adds an async `run` and a non-blocking `stop` hook.
//!   The same trait covers the main service and background services; the role
//!   is decided at registration time.
//! * [`Reloadable`] is the voluntary reload capability, exposed through
//!   [`Service::as_reloadable`].

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::shutdown::ShutdownReason;

/// Future returned by [`RunnableService::run`].
pub type ServiceFuture = BoxFuture<'static, Result<()>>;

/// Anything that can be registered with the supervisor.
pub trait Service: Send + Sync + 'static {
    /// Unique name identifying this service.
    fn name(&self) -> &str;

    /// Reload capability, if this service supports it.
    fn as_reloadable(&self) -> Option<&dyn Reloadable> {
        None
    }
}

/// Voluntary reload capability.
pub trait Reloadable: Send + Sync {
    /// Re-read configuration or otherwise refresh the service in place.
    ///
    /// A failure is reported by the supervisor but never stops the service.
    fn reload(&self) -> BoxFuture<'_, Result<()>>;
}

/// A service with its own lifetime.
pub trait RunnableService: Service {
    /// Run the service until it finishes or `stop` asks it to return.
    fn run(&self, stop: StopHandle) -> ServiceFuture;

    /// Non-blocking stop hook, called when the supervisor requests a stop.
    ///
    /// The [`StopHandle`] given to `run` is triggered at the same time, so
    /// services that watch their handle can leave this empty.
    fn stop(&self) {}
}

impl<T: Service + ?Sized> Service for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn as_reloadable(&self) -> Option<&dyn Reloadable> {
        (**self).as_reloadable()
    }
}

impl<T: RunnableService + ?Sized> RunnableService for Arc<T> {
    fn run(&self, stop: StopHandle) -> ServiceFuture {
        (**self).run(stop)
    }

    fn stop(&self) {
        (**self).stop();
    }
}

/// Role of a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceRole {
    /// Drives the process lifetime
    Main,
    /// Background service whose termination forces shutdown
    Critical,
    /// Background service
    Background,
    /// Registered for reload/inventory only; never run
    Passive,
}

impl std::fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Critical => write!(f, "critical"),
            Self::Background => write!(f, "background"),
            Self::Passive => write!(f, "passive"),
        }
    }
}

/// Cooperative stop request handed to [`RunnableService::run`].
#[derive(Debug, Clone)]
pub struct StopHandle {
    name: Arc<str>,
    token: CancellationToken,
    reason: Arc<Mutex<Option<ShutdownReason>>>,
}

impl StopHandle {
    pub(crate) fn new(name: Arc<str>, token: CancellationToken) -> Self {
        Self {
            name,
            token,
            reason: Arc::new(Mutex::new(None)),
        }
    }

    /// Name of the service this handle belongs to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the supervisor has asked this service to stop.
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the supervisor asks this service to stop.
    ///
    /// This is the primary method services should use in their main loops.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }

    /// Why the process is shutting down, once a stop has been requested.
    #[must_use]
    pub fn shutdown_reason(&self) -> Option<ShutdownReason> {
        self.reason.lock().clone()
    }

    pub(crate) fn request_stop(&self, reason: Option<ShutdownReason>) {
        if let Some(reason) = reason {
            self.reason.lock().get_or_insert(reason);
        }
        self.token.cancel();
    }
}

/// A runnable service built from an async closure. See [`service_fn`].
pub struct FnService<F> {
    name: String,
    func: F,
}

/// Build a [`RunnableService`] from a name and an async closure.
///
/// ```no_run
/// use app_supervisor::{service_fn, StopHandle};
///
/// let ticker = service_fn("ticker", |stop: StopHandle| async move {
///     stop.stopped().await;
///     Ok(())
/// });
/// ```
pub fn service_fn<F, Fut>(name: impl Into<String>, func: F) -> FnService<F>
where
    F: Fn(StopHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnService {
        name: name.into(),
        func,
    }
}

impl<F> std::fmt::Debug for FnService<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnService").field("name", &self.name).finish()
    }
}

impl<F, Fut> Service for FnService<F>
where
    F: Fn(StopHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }
}

impl<F, Fut> RunnableService for FnService<F>
where
    F: Fn(StopHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn run(&self, stop: StopHandle) -> ServiceFuture {
        Box::pin((self.func)(stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Cache;

    impl Service for Cache {
        fn name(&self) -> &str {
            "cache"
        }
    }

    #[test]
    fn test_passive_service_defaults() {
        let cache = Cache;
        assert_eq!(cache.name(), "cache");
        assert!(cache.as_reloadable().is_none());
    }

    #[test]
    fn test_stop_handle_records_first_reason() {
        let handle = StopHandle::new(Arc::from("worker"), CancellationToken::new());
        assert!(!handle.is_stop_requested());
        assert!(handle.shutdown_reason().is_none());

        handle.request_stop(Some(ShutdownReason::Signal(2)));
        handle.request_stop(Some(ShutdownReason::Requested));

        assert!(handle.is_stop_requested());
        assert_eq!(handle.shutdown_reason(), Some(ShutdownReason::Signal(2)));
        assert_eq!(handle.name(), "worker");
    }

    #[tokio::test]
    async fn test_fn_service_observes_stop() {
        let test_result = tokio::time::timeout(Duration::from_secs(5), async {
            let svc = service_fn("loop", |stop: StopHandle| async move {
                let mut ticks = 0u32;
                loop {
                    tokio::select! {
                        () = stop.stopped() => break,
                        () = tokio::time::sleep(Duration::from_millis(5)) => ticks += 1,
                    }
                }
                assert!(ticks < 10_000);
                Ok(())
            });
            assert_eq!(svc.name(), "loop");

            let handle = StopHandle::new(Arc::from("loop"), CancellationToken::new());
            let task = tokio::spawn(svc.run(handle.clone()));
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.request_stop(None);

            task.await.unwrap().unwrap();
        })
        .await;

        assert!(test_result.is_ok(), "Test timed out after 5 seconds");
    }
}
