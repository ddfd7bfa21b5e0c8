//! Worker pool example: an HTTP-like main service, a critical queue consumer,
//! a few best-effort workers and a reloadable settings service.
//!
//! Send SIGHUP to reload, SIGTERM or Ctrl+C to stop.

use app_supervisor::{
    service_fn, Config, Reloadable, Result, Service, SignalListener, StopHandle, Supervisor,
};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

struct Settings {
    generation: AtomicU64,
}

impl Service for Settings {
    fn name(&self) -> &str {
        "settings"
    }

    fn as_reloadable(&self) -> Option<&dyn Reloadable> {
        Some(self)
    }
}

impl Reloadable for Settings {
    fn reload(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            info!(generation, "Settings reloaded");
            Ok(())
        })
    }
}

async fn worker(id: u32, stop: StopHandle) -> Result<()> {
    let mut jobs = 0u64;
    loop {
        tokio::select! {
            () = stop.stopped() => {
                info!(worker = id, jobs, reason = ?stop.shutdown_reason(), "Worker stopping");
                return Ok(());
            }
            () = tokio::time::sleep(Duration::from_millis(500)) => jobs += 1,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    app_supervisor::logging::init(&config.logging)?;

    let settings = Arc::new(Settings {
        generation: AtomicU64::new(0),
    });

    let mut builder = Supervisor::builder(config)
        .with_config_path(app_supervisor::DEFAULT_CONFIG_FILE)
        .with_service(Arc::clone(&settings))
        .with_main_service(service_fn("http", |stop: StopHandle| async move {
            info!("Accepting requests");
            stop.stopped().await;
            info!("Draining connections");
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }))
        .with_critical_service(service_fn("queue", |stop: StopHandle| async move {
            stop.stopped().await;
            Ok(())
        }));

    for id in 0..3 {
        builder = builder.with_runnable(service_fn(format!("worker-{id}"), move |stop| worker(id, stop)));
    }

    let supervisor = builder
        .with_exit_handler(|| info!("Flushed pending writes"))
        .with_exit_handler(|| info!("Closed database pool"))
        .build()?;

    supervisor.output_env();
    let _signals = SignalListener::new(supervisor.clone()).spawn();
    supervisor.run().await
}
