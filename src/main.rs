use anyhow::Context;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use travel_booking::{app, config::Config, AppState};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("invalid configuration")?;

    let filter = tracing_subscriber::EnvFilter::new(&config.app.rust_log);
    if config.is_json_logging() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting Travel Booking API ({})", config.app.environment);

    let state = AppState::new(config.clone()).await.context("failed to build application state")?;

    // --- Background tasks ---
    if config.sweeper.enabled {
        state.sweeper.clone().spawn();
    } else {
        info!("Expiration sweeper disabled; holds expire lazily or via /api/maintenance/expire-holds");
    }

    // --- Web server ---
    let router = app(state);
    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .context("invalid listen address")?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router.into_make_service()).await?;
    Ok(())
}
