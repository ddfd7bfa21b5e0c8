//! Lifecycle state machine and shutdown coordination.
//!
//! A supervisor moves through [`LifecycleState`] strictly forward:
//!
//! ```text
//! Setup ──run()──▶ Running ──trigger──▶ ShuttingDown ──teardown──▶ Terminated
//! ```
//!
//! A shutdown requested during `Setup` is remembered; `run()` then skips
//! launching services and goes straight to teardown.
//!
//! Shutdown has two distinct moments:
//!
//! * the **request** (any trigger: `shutdown()`, a signal, main exiting, a
//!   critical service terminating). The first request records the
//!   [`ShutdownReason`]; later ones are ignored.
//! * the **shutdown signal**, fired exactly once after every service was asked
//!   to stop and either acknowledged or ran out its grace period. Exit
//!   handlers run after it; [`ShutdownHandle`] waiters are released after them.

use parking_lot::Mutex;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Reason for shutdown initiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Shutdown requested programmatically
    Requested,
    /// Shutdown requested via signal (SIGTERM, SIGINT, etc.)
    Signal(i32),
    /// The main service returned on its own
    MainServiceExited,
    /// The main service returned an error or panicked
    MainServiceFailed,
    /// A critical background service terminated
    CriticalService(String),
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "Requested"),
            Self::Signal(sig) => write!(f, "Signal({sig})"),
            Self::MainServiceExited => write!(f, "MainServiceExited"),
            Self::MainServiceFailed => write!(f, "MainServiceFailed"),
            Self::CriticalService(name) => write!(f, "CriticalService({name})"),
        }
    }
}

/// Supervisor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    /// Services are being registered
    Setup,
    /// `run()` has launched the services
    Running,
    /// Teardown is in progress
    ShuttingDown,
    /// Teardown finished: signal fired and exit handlers drained
    Terminated,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup => write!(f, "Setup"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Shared lifecycle state between the supervisor, its clones and its handles.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: watch::Sender<LifecycleState>,
    /// Set exactly once when the shutdown signal fires
    fired: AtomicBool,
    /// First recorded shutdown reason
    reason: Mutex<Option<ShutdownReason>>,
    /// Cancelled on the first shutdown request
    requested: CancellationToken,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Setup);
        Self {
            state,
            fired: AtomicBool::new(false),
            reason: Mutex::new(None),
            requested: CancellationToken::new(),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Move `from → to`. Returns false (and changes nothing) if the current
    /// state is not `from`.
    pub(crate) fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        let moved = self.state.send_if_modified(|current| {
            if *current == from {
                *current = to;
                true
            } else {
                false
            }
        });
        if moved {
            debug!(%from, %to, "Lifecycle transition");
        }
        moved
    }

    /// Record a shutdown request. Returns true if this call was the first.
    pub(crate) fn request(&self, reason: ShutdownReason) -> bool {
        let mut slot = self.reason.lock();
        if slot.is_some() {
            debug!(%reason, "Shutdown already requested, ignoring additional request");
            return false;
        }
        info!(%reason, "Shutdown requested");
        *slot = Some(reason);
        drop(slot);
        self.requested.cancel();
        true
    }

    pub(crate) fn is_requested(&self) -> bool {
        self.requested.is_cancelled()
    }

    pub(crate) fn reason(&self) -> Option<ShutdownReason> {
        self.reason.lock().clone()
    }

    pub(crate) const fn requested_token(&self) -> &CancellationToken {
        &self.requested
    }

    /// Fire the shutdown signal. Returns true only for the first call.
    pub(crate) fn fire(&self) -> bool {
        let first = !self.fired.swap(true, Ordering::AcqRel);
        if first {
            info!("Shutdown signal fired");
        }
        first
    }

    pub(crate) fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    pub(crate) fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            rx: self.state.subscribe(),
        }
    }
}

/// Waiter that resolves once teardown has fully completed.
///
/// Handles are cheap to clone and any number of tasks may wait on them.
/// Awaiting a handle (directly, or via [`ShutdownHandle::wait`]) never
/// triggers teardown by itself.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    rx: watch::Receiver<LifecycleState>,
}

impl ShutdownHandle {
    /// Whether teardown has completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        *self.rx.borrow() == LifecycleState::Terminated
    }

    /// Wait until teardown has completed.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // An error means the supervisor is gone; nothing is left to wait for.
        let _ = rx.wait_for(|s| *s == LifecycleState::Terminated).await;
    }
}

impl IntoFuture for ShutdownHandle {
    type Output = ();
    type IntoFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}
