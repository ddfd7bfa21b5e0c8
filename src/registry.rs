//! Registry of services, the designated main service and the critical set.
//!
//! The registry is a plain single-owner structure. The [`Supervisor`]
//! wraps it in a lock and closes it for writes once `run()` starts.
//!
//! [`Supervisor`]: crate::Supervisor

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::service::{RunnableService, Service, ServiceRole};

struct ServiceEntry {
    name: Arc<str>,
    service: Arc<dyn Service>,
    runnable: Option<Arc<dyn RunnableService>>,
}

/// Snapshot of one registered service.
#[derive(Clone)]
pub struct RegisteredService {
    /// Service name
    pub name: Arc<str>,
    /// Role at the time of the snapshot
    pub role: ServiceRole,
    /// The service itself
    pub service: Arc<dyn Service>,
}

impl std::fmt::Debug for RegisteredService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredService")
            .field("name", &self.name)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// A background service to launch, as handed to the supervisor at `run()`.
pub(crate) struct BackgroundService {
    pub(crate) name: Arc<str>,
    pub(crate) service: Arc<dyn RunnableService>,
    pub(crate) critical: bool,
}

/// Registered services, in registration order.
#[derive(Default)]
pub struct Registry {
    entries: Vec<ServiceEntry>,
    index: HashMap<Arc<str>, usize>,
    main: Option<usize>,
    critical: HashSet<Arc<str>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("services", &self.entries.iter().map(|e| &e.name).collect::<Vec<_>>())
            .field("main", &self.main_service_name())
            .field("critical", &self.critical)
            .finish()
    }
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a passive service.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::DuplicateService`](crate::ErrorCode::DuplicateService)
    /// if the name is already taken.
    pub fn register_service<S: Service>(&mut self, svc: S) -> Result<()> {
        let service: Arc<dyn Service> = Arc::new(svc);
        self.insert(service, None).map(|_| ())
    }

    /// Register a background runnable service.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::DuplicateService`](crate::ErrorCode::DuplicateService)
    /// if the name is already taken.
    pub fn register_runnable<S: RunnableService>(&mut self, svc: S) -> Result<()> {
        let svc = Arc::new(svc);
        let runnable: Arc<dyn RunnableService> = svc.clone();
        let service: Arc<dyn Service> = svc;
        self.insert(service, Some(runnable)).map(|_| ())
    }

    /// Register `svc` and designate it the main service.
    ///
    /// On failure the registry is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::MainServiceAlreadySet`](crate::ErrorCode::MainServiceAlreadySet)
    /// if a main service exists, or
    /// [`ErrorCode::DuplicateService`](crate::ErrorCode::DuplicateService)
    /// if the name is already taken.
    pub fn register_main_service<S: RunnableService>(&mut self, svc: S) -> Result<()> {
        if let Some(current) = self.main_service_name() {
            return Err(Error::main_service_already_set(svc.name(), current));
        }
        let svc = Arc::new(svc);
        let runnable: Arc<dyn RunnableService> = svc.clone();
        let service: Arc<dyn Service> = svc;
        let idx = self.insert(service, Some(runnable))?;
        self.main = Some(idx);
        Ok(())
    }

    /// Mark an already-registered runnable service as critical.
    ///
    /// Marking the main service is accepted; its exit ends the process anyway.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::ServiceNotRegistered`](crate::ErrorCode::ServiceNotRegistered)
    /// for an unknown name, or
    /// [`ErrorCode::ServiceNotRunnable`](crate::ErrorCode::ServiceNotRunnable)
    /// for a passive service. The registry is unchanged on error.
    pub fn set_critical_service(&mut self, name: &str) -> Result<()> {
        let entry = self
            .index
            .get(name)
            .map(|&idx| &self.entries[idx])
            .ok_or_else(|| Error::service_not_registered(name))?;
        if entry.runnable.is_none() {
            return Err(Error::service_not_runnable(name));
        }
        let key = Arc::clone(&entry.name);
        debug!(service = %key, "Marked service critical");
        self.critical.insert(key);
        Ok(())
    }

    fn insert(
        &mut self,
        service: Arc<dyn Service>,
        runnable: Option<Arc<dyn RunnableService>>,
    ) -> Result<usize> {
        let name: Arc<str> = Arc::from(service.name());
        if self.index.contains_key(&name) {
            return Err(Error::duplicate_service(name.as_ref()));
        }
        let idx = self.entries.len();
        self.index.insert(Arc::clone(&name), idx);
        self.entries.push(ServiceEntry {
            name,
            service,
            runnable,
        });
        Ok(idx)
    }

    /// The main service, if one was designated.
    #[must_use]
    pub fn main_service(&self) -> Option<Arc<dyn RunnableService>> {
        self.main.and_then(|idx| self.entries[idx].runnable.clone())
    }

    /// Name of the main service, if one was designated.
    #[must_use]
    pub fn main_service_name(&self) -> Option<&str> {
        self.main.map(|idx| self.entries[idx].name.as_ref())
    }

    /// Snapshot of all registered services, in registration order.
    #[must_use]
    pub fn services(&self) -> Vec<RegisteredService> {
        self.entries
            .iter()
            .enumerate()
            .map(|(idx, e)| RegisteredService {
                name: Arc::clone(&e.name),
                role: self.role_of(idx),
                service: Arc::clone(&e.service),
            })
            .collect()
    }

    /// Role of the named service, if registered.
    #[must_use]
    pub fn role(&self, name: &str) -> Option<ServiceRole> {
        self.index.get(name).map(|&idx| self.role_of(idx))
    }

    fn role_of(&self, idx: usize) -> ServiceRole {
        let entry = &self.entries[idx];
        if self.main == Some(idx) {
            ServiceRole::Main
        } else if entry.runnable.is_none() {
            ServiceRole::Passive
        } else if self.critical.contains(&entry.name) {
            ServiceRole::Critical
        } else {
            ServiceRole::Background
        }
    }

    /// Whether the named service is marked critical.
    #[must_use]
    pub fn is_critical(&self, name: &str) -> bool {
        self.critical.contains(name)
    }

    /// Whether a service with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no service is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runnable services other than main, in registration order.
    pub(crate) fn background(&self) -> Vec<BackgroundService> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.main != Some(*idx))
            .filter_map(|(_, e)| {
                e.runnable.as_ref().map(|svc| BackgroundService {
                    name: Arc::clone(&e.name),
                    service: Arc::clone(svc),
                    critical: self.critical.contains(&e.name),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::service::{service_fn, StopHandle};

    struct Passive(&'static str);

    impl Service for Passive {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn worker(name: &'static str) -> impl RunnableService {
        service_fn(name, |stop: StopHandle| async move {
            stop.stopped().await;
            Ok(())
        })
    }

    #[test]
    fn test_services_returns_all_registered_in_order() {
        let mut registry = Registry::new();
        registry.register_service(Passive("db")).unwrap();
        registry.register_runnable(worker("queue")).unwrap();
        registry.register_main_service(worker("http")).unwrap();
        registry.register_service(Passive("cache")).unwrap();

        let names: Vec<String> = registry
            .services()
            .iter()
            .map(|s| s.name.to_string())
            .collect();
        assert_eq!(names, ["db", "queue", "http", "cache"]);
        assert_eq!(registry.len(), 4);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = Registry::new();
        registry.register_service(Passive("db")).unwrap();

        let err = registry.register_runnable(worker("db")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateService);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.role("db"), Some(ServiceRole::Passive));
    }

    #[test]
    fn test_second_main_rejected_first_intact() {
        let mut registry = Registry::new();
        registry.register_main_service(worker("http")).unwrap();

        let err = registry.register_main_service(worker("grpc")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MainServiceAlreadySet);
        assert_eq!(registry.main_service_name(), Some("http"));
        assert_eq!(registry.main_service().unwrap().name(), "http");
        assert!(!registry.contains("grpc"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_critical_requires_registration() {
        let mut registry = Registry::new();
        registry.register_runnable(worker("queue")).unwrap();

        let err = registry.set_critical_service("ghost").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServiceNotRegistered);
        assert!(!registry.is_critical("ghost"));
        assert!(!registry.is_critical("queue"));
        assert_eq!(registry.len(), 1);

        registry.set_critical_service("queue").unwrap();
        assert!(registry.is_critical("queue"));
        assert_eq!(registry.role("queue"), Some(ServiceRole::Critical));
    }

    #[test]
    fn test_passive_cannot_be_critical() {
        let mut registry = Registry::new();
        registry.register_service(Passive("db")).unwrap();

        let err = registry.set_critical_service("db").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServiceNotRunnable);
        assert!(!registry.is_critical("db"));
    }

    #[test]
    fn test_background_excludes_main_and_passive() {
        let mut registry = Registry::new();
        registry.register_main_service(worker("http")).unwrap();
        registry.register_service(Passive("db")).unwrap();
        registry.register_runnable(worker("queue")).unwrap();
        registry.register_runnable(worker("metrics")).unwrap();
        registry.set_critical_service("queue").unwrap();

        let background = registry.background();
        let summary: Vec<(&str, bool)> = background
            .iter()
            .map(|b| (b.name.as_ref(), b.critical))
            .collect();
        assert_eq!(summary, [("queue", true), ("metrics", false)]);
    }

    #[test]
    fn test_shared_service_via_arc() {
        let shared = Arc::new(Passive("shared"));
        let mut registry = Registry::new();
        registry.register_service(Arc::clone(&shared)).unwrap();
        assert!(registry.contains("shared"));
        assert_eq!(Arc::strong_count(&shared), 2);
    }
}
