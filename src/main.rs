use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shrike::analytics::Manager;
use shrike::config::Config;
use shrike::store::Store;
use shrike::{api, metrics, redirect};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let default_level = if std::env::var("APP_ENABLE_DEBUG_LOGS")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
    {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    if let Err(e) = metrics::init_metrics() {
        warn!(error = %e, "failed to initialize metrics registry");
    }

    let store = Arc::new(Store::new(&config.db, config.app.short_url_length).await?);
    info!(path = %config.db.path, "store initialized");

    let analytics = match Manager::new(&config.analytics).await? {
        Some(manager) => {
            let manager = Arc::new(manager);
            manager.start();
            info!(
                num_workers = config.analytics.num_workers,
                "analytics manager started"
            );
            Some(manager)
        }
        None => {
            info!("analytics is disabled");
            None
        }
    };

    let app = api::create_api_router(Arc::clone(&store), config.app.public_url.clone()).merge(
        redirect::create_redirect_router(
            Arc::clone(&store),
            analytics.clone(),
            config.app.public_url.clone(),
        ),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(manager) = analytics {
        manager.close().await;
    }
    store.close().await;
    info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
