use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, bail};
use tracing::{info, warn};

use batch_dispatch::config::{DispatcherConfig, WorkerConfig};
use batch_dispatch::dispatcher::{Dispatcher, server, spawn_liveness_sweep};
use batch_dispatch::logging::init_logging;
use batch_dispatch::worker::{ShellExecutor, WorkerAgent, WsConnector};

const USAGE: &str = "usage: batch-dispatch <dispatcher|worker>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_dir = std::env::var_os("DISPATCH_LOG_DIR").map(PathBuf::from);
    let _log_guard = init_logging(log_dir.as_deref());

    let role = std::env::args().nth(1).unwrap_or_default();
    match role.as_str() {
        "dispatcher" => run_dispatcher().await,
        "worker" => run_worker().await,
        "" => bail!("{USAGE}"),
        other => bail!("unknown role '{other}'\n{USAGE}"),
    }
}

async fn run_dispatcher() -> anyhow::Result<()> {
    let config = DispatcherConfig::from_env().context("invalid dispatcher configuration")?;
    eprintln!("📦 batch-dispatch v{} (dispatcher)", env!("CARGO_PKG_VERSION"));
    eprintln!("   Worker WS: ws://{}/ws", config.listen_addr);
    eprintln!("   Status:    http://{}/api/workers", config.listen_addr);

    let dispatcher = Dispatcher::bootstrap(&config)
        .await
        .context("failed to start dispatcher")?;

    let _sweep_handle = spawn_liveness_sweep(Arc::clone(&dispatcher), config.sweep_interval);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tokio::select! {
        result = server::serve(listener, dispatcher) => result.context("dispatcher server failed")?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down dispatcher"),
    }
    Ok(())
}

async fn run_worker() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env().context("invalid worker configuration")?;
    eprintln!("🛠  batch-dispatch v{} (worker)", env!("CARGO_PKG_VERSION"));
    eprintln!("   Worker: {} (class {})", config.worker_id, config.class);
    eprintln!("   Server: {}", config.server_url);

    let connector = Arc::new(WsConnector::new(config.server_url.clone()));
    let executor = Arc::new(ShellExecutor::new(config.payload_timeout));
    let agent = Arc::new(WorkerAgent::new(config, connector, executor));

    let shutdown = agent.shutdown_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current request");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    agent.run().await;
    Ok(())
}
