//! Metacat server binary.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metacat_server::{create_transport, Args, CatalogService, RequestHandler};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "metacat_server=info,metacat_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        protocol_version = metacat_proto::PROTOCOL_VERSION,
        "starting metacat server"
    );

    let config = Args::parse().into_config();

    tracing::info!(
        data_path = %config.data_path.display(),
        warehouse = %config.warehouse,
        tcp_address = ?config.tcp_address,
        ipc_address = ?config.ipc_address,
        workers = config.transport_workers,
        "configuration loaded"
    );

    let service = Arc::new(CatalogService::open(&config.store_config())?);
    tracing::info!(default_catalog = service.default_catalog(), "catalog opened");

    let handler = Arc::new(RequestHandler::new(service.clone()));
    let transport = create_transport(&config, handler)?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(());
    });

    tracing::info!("server ready, accepting connections");
    if let Err(e) = transport.run_until_shutdown(shutdown_rx).await {
        tracing::error!(error = %e, "server error");
        return Err(e.into());
    }

    service.flush()?;
    tracing::info!("server shutdown complete");
    Ok(())
}
