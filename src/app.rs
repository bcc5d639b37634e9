use crate::config::Config;
use crate::server::{HttpServer, SharedState};
use crate::storage::FileStore;
use crate::telemetry::Metrics;
use crate::vision::AzureVisionClient;

use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let file_store = match FileStore::open(&config.storage.upload_dir).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Failed to open upload directory: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let vision_client = match AzureVisionClient::new(&config.vision) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("Failed to initialize vision client: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let metrics = Arc::new(Metrics::new()?);
    let state = SharedState {
        file_store,
        vision_client,
        metrics: metrics.clone(),
    };

    let server = HttpServer::new(state, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;
    metrics.shutdown();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
