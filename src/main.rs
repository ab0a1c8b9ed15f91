use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use comfyui_cloud_proxy::{api, config::Config, AppState};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        tracing::error!("Proxy failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    Config::dotenv_load();
    let config = Config::new()?;
    config.print_env_vars();

    let state = Arc::new(AppState::from_config(&config)?);
    state.runner.generator().store().remove_stale_temp_files().await?;
    let shutdown = state.runner.shutdown_token();
    let app = api::app(Arc::clone(&state));

    let ip: std::net::IpAddr = config.listen_host.parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid LISTEN_HOST '{}', falling back to 127.0.0.1", config.listen_host);
        std::net::IpAddr::from([127, 0, 0, 1])
    });
    let socket_address = SocketAddr::new(ip, config.listen_port);
    tracing::info!("ComfyUI cloud proxy listening on http://{}", socket_address);

    axum::Server::try_bind(&socket_address)?
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down, cancelling in-flight generations");
            shutdown.cancel();
        })
        .await?;

    tracing::info!("ComfyUI cloud proxy stopped");
    Ok(())
}
