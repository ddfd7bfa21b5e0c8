use app_supervisor::{service_fn, Config, Error, StopHandle, Supervisor};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;

fn bench_config() -> Config {
    Config::builder()
        .name("bench-app")
        .grace_period(Duration::from_millis(100))
        .unwrap()
        .build()
        .unwrap()
}

fn bench_supervisor_creation(c: &mut Criterion) {
    c.bench_function("supervisor_creation", |b| {
        b.iter(|| {
            let supervisor = Supervisor::builder(bench_config()).build().unwrap();
            black_box(supervisor);
        });
    });
}

fn bench_service_registration(c: &mut Criterion) {
    c.bench_function("service_registration", |b| {
        b.iter(|| {
            let supervisor = Supervisor::builder(bench_config())
                .with_main_service(service_fn("main", |_stop: StopHandle| async { Ok(()) }))
                .with_runnable(service_fn("bench1", |_stop: StopHandle| async { Ok(()) }))
                .with_runnable(service_fn("bench2", |_stop: StopHandle| async { Ok(()) }))
                .with_critical_service(service_fn("bench3", |_stop: StopHandle| async {
                    Ok(())
                }))
                .build()
                .unwrap();
            black_box(supervisor);
        });
    });
}

fn bench_config_building(c: &mut Criterion) {
    c.bench_function("config_building", |b| {
        b.iter(|| black_box(bench_config()));
    });
}

fn bench_run_and_teardown(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("run_and_teardown", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let start = std::time::Instant::now();
                for _ in 0..iters {
                    let supervisor = Supervisor::builder(bench_config())
                        .with_main_service(service_fn("quick", |_stop: StopHandle| async {
                            Ok(())
                        }))
                        .with_runnable(service_fn("worker", |stop: StopHandle| async move {
                            stop.stopped().await;
                            Ok(())
                        }))
                        .with_exit_handler(|| {})
                        .build()
                        .unwrap();

                    supervisor.run().await.unwrap();
                    black_box(supervisor);
                }
                start.elapsed()
            })
        });
    });
}

fn bench_shutdown_requests(c: &mut Criterion) {
    let supervisor = Supervisor::builder(bench_config()).build().unwrap();

    c.bench_function("repeated_shutdown_request", |b| {
        b.iter(|| black_box(supervisor.shutdown()));
    });
}

fn bench_error_creation(c: &mut Criterion) {
    c.bench_function("error_creation", |b| {
        b.iter(|| {
            let err = Error::service_failed(black_box("bench"), Error::config("benchmark error"));
            black_box(err);
        });
    });

    c.bench_function("error_chain", |b| {
        b.iter(|| {
            let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout");
            let err = Error::io_with_source(black_box("operation failed"), io_err);
            black_box(err);
        });
    });
}

criterion_group!(
    benches,
    bench_supervisor_creation,
    bench_service_registration,
    bench_config_building,
    bench_run_and_teardown,
    bench_shutdown_requests,
    bench_error_creation
);
criterion_main!(benches);
