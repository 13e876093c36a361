use crate::config::Config;
use crate::webserver::HealthState;
use anyhow::Context;
use std::env;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod config;
mod controller;
mod error;
mod filter;
mod image_reference;
mod resources;
mod state;
mod store;
mod webserver;

#[cfg(target_env = "musl")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    info!("Starting rag-imagestream-sync {}", env!("CARGO_PKG_VERSION"));

    let config = match env::var("CONFIG_PATH") {
        Ok(path) => config::load_config(&path)?,
        Err(_) => {
            info!("CONFIG_PATH is not set, using default configuration");
            Config::default()
        }
    };

    let client = controller::create_client().await?;
    let health = HealthState::default();
    let shutdown = CancellationToken::new();

    let app = webserver::create_app(health.clone());
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.webserver.port));
    info!("Starting webserver on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind webserver to {}", addr))?;
    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
    });

    let result = controller::run(client, &config, health).await;
    shutdown.cancel();
    if let Err(e) = &result {
        error!("Controller exited with error: {:?}", e);
    }

    server.await.context("Webserver task panicked")??;
    info!("Shutdown complete");
    result
}
