//! Signal listener tests. These deliver real signals to the test process, so
//! they live in their own test binary.

#![cfg(unix)]

use app_supervisor::signal::{SIGHUP, SIGTERM};
use app_supervisor::{
    service_fn, Config, LogLevel, Reloadable, Result, Service, ShutdownReason, SignalListener,
    StopHandle, Supervisor,
};
use futures::future::BoxFuture;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

struct Counter(AtomicUsize);

impl Service for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    fn as_reloadable(&self) -> Option<&dyn Reloadable> {
        Some(self)
    }
}

impl Reloadable for Counter {
    fn reload(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

fn send_signal(signal: i32) {
    let status = Command::new("kill")
        .arg(format!("-{signal}"))
        .arg(std::process::id().to_string())
        .status()
        .expect("failed to run kill");
    assert!(status.success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[cfg_attr(miri, ignore)]
async fn test_sighup_reloads_and_sigterm_shuts_down() {
    let test_result = timeout(Duration::from_secs(10), async {
        let config = Config::builder()
            .name("signal-test")
            .log_level(LogLevel::Error)
            .build()
            .unwrap();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let supervisor = Supervisor::builder(config)
            .with_service(Arc::clone(&counter))
            .with_main_service(service_fn("http", |stop: StopHandle| async move {
                stop.stopped().await;
                Ok(())
            }))
            .build()
            .unwrap();

        let listener = SignalListener::new(supervisor.clone()).spawn();
        let runner = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.run().await }
        });
        // Handlers must be installed before the first signal arrives.
        tokio::time::sleep(Duration::from_millis(200)).await;

        send_signal(SIGHUP);
        for _ in 0..100 {
            if counter.0.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(supervisor.is_running());

        send_signal(SIGTERM);
        runner.await.unwrap().unwrap();
        listener.await.unwrap().unwrap();

        assert_eq!(
            supervisor.shutdown_reason(),
            Some(ShutdownReason::Signal(SIGTERM))
        );
        assert!(supervisor.is_shutdown());
    })
    .await;

    assert!(test_result.is_ok(), "Test timed out after 10 seconds");
}
