use std::sync::Arc;

use clap::Parser;
use garimpo_dispatcher::{Dispatcher, NotificationHub};
use garimpo_host::{probes::stub_probes, server, AppState, Opts};
use garimpo_taskpool::{PoolConfig, TaskStore};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

fn init_tracing(opts: &Opts) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&opts.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match &opts.log_path {
        Some(log_path) => {
            let appender = tracing_appender::rolling::daily(log_path, "garimpo-host.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            builder.with_writer(writer).with_ansi(false).init();
            Some(guard)
        }
        None => {
            builder.init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut opts = Opts::parse();
    opts.merge_from_file()?;
    let _guard = init_tracing(&opts);

    let store = TaskStore::open(PoolConfig {
        redis_url: opts.redis_url.clone(),
        redis_ttl: opts.pipeline.retention_ttl_secs,
        enable_redis: !opts.in_memory,
    })?;

    let hub = NotificationHub::spawn();
    let dispatcher = Dispatcher::new(store, hub, opts.pipeline.clone());

    // Real source integrations register here; the stubs keep every worker
    // runnable until they are deployed.
    let probes = stub_probes();
    let cancel = CancellationToken::new();
    let handles = garimpo_dispatcher::spawn(&dispatcher, &probes, cancel.clone());

    let state = AppState {
        dispatcher,
        opts: Arc::new(opts),
    };

    tokio::select! {
        result = server::serve(state) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}
