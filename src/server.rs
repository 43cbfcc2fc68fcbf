use std::sync::Arc;

use tokio::{net::TcpListener, signal};
use tracing::{error, info};

use crate::{
    ai_utils::GatewayClient,
    api::{AppState, router},
    auth::resolver_from_config,
    config::Config,
    store::Store,
};

pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    if config.gateway.api_key.is_empty() {
        anyhow::bail!("no gateway key configured, set AI_GATEWAY_KEY or LOVABLE_API_KEY");
    }
    let store = Store::connect(&config.database_url).await?;
    Ok(AppState {
        store,
        backend: Arc::new(GatewayClient::new(&config.gateway)),
        identity: resolver_from_config(&config.auth)?,
    })
}

/// Serve the generation functions until Ctrl+C or SIGTERM.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let state = Arc::new(build_state(&config).await?);
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("listening on http://{}", listener.local_addr()?);
    info!(
        "Swagger UI available at http://{}:{}/swagger-ui",
        config.host, config.port
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(e) => {
                error!("failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(e) => {
                error!("failed to install signal handler: {e}");
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
}
