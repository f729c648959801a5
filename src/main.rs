use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use numscan::{router, AppState, Config, TesseractCli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("numscan=info,tower_http=info")),
        )
        .init();

    tracing::info!("Starting numscan...");

    let config = Config::from_env()?;
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("failed to create {}", config.upload_dir.display()))?;
    tracing::info!(
        "Uploads staged under {}, images scaled to width {}",
        config.upload_dir.display(),
        config.target_width
    );

    let engine = TesseractCli::new(config.tesseract_bin.clone()).with_lang(config.ocr_lang.clone());
    match engine.probe() {
        Ok(version) => tracing::info!("OCR engine ready: {}", version),
        Err(err) => tracing::warn!("OCR engine unavailable, recognition will fail: {:#}", err),
    }

    let addr = config.addr;
    let app = router(AppState::new(config, Arc::new(engine)));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down");
}
