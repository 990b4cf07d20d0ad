use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use lunchbox::clock::SystemClock;
use lunchbox::config::Config;
use lunchbox::dispatch::{Dispatcher, SessionTtls};
use lunchbox::engine::Engine;
use lunchbox::gateway;
use lunchbox::repo::WalRepository;
use lunchbox::session::ExpiringStore;
use lunchbox::sweeper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    lunchbox::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let repo = Arc::new(WalRepository::open(config.data_dir.join("lunchbox.wal"))?);
    let engine = Arc::new(Engine::new(repo.clone(), config.cutoff_policy()));
    let sessions = Arc::new(ExpiringStore::new());
    let dispatcher = Arc::new(Dispatcher::new(
        engine,
        sessions.clone(),
        config.admins.clone(),
        Arc::new(SystemClock),
        SessionTtls {
            menu_edit: config.menu_edit_ttl,
            selection: config.selection_ttl,
        },
    ));

    tokio::spawn(sweeper::run_sweeper(sessions, config.sweep_interval));
    tokio::spawn(sweeper::run_compactor(repo, config.compact_threshold));

    let max_connections = config.max_connections;
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("lunchbox listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  max_connections: {max_connections}");
    info!("  timezone: {}, cutoff: {}", config.timezone, config.cutoff.format("%H:%M"));
    info!("  admins: {}", config.admins.len());
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("failed to register SIGTERM handler: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(lunchbox::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(lunchbox::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(lunchbox::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let dispatcher = dispatcher.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = gateway::process_connection(socket, dispatcher).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(lunchbox::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("lunchbox stopped");
    Ok(())
}
