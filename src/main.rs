//! Daily Brief Service — Binary Entrypoint
//! Boots the Axum HTTP server, wiring storage, the generative client and
//! routes.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use daily_brief::api::{self, AppState};
use daily_brief::config::{AiSettings, SearchKeys, ServerSettings};
use daily_brief::metrics::Metrics;
use daily_brief::{ai, store};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("daily_brief=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in production environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics = Metrics::init();

    let storage = store::select_storage().await?;
    info!(backend = storage.backend_name(), "storage ready");

    let ai_client = ai::build_client(&AiSettings::from_env());
    info!(provider = ai_client.provider_name(), "generative client ready");

    let state = AppState {
        storage,
        ai: ai_client,
        search_keys: Arc::new(SearchKeys::from_env()),
    };
    let router = api::create_router(state).merge(metrics.router());

    let settings = ServerSettings::from_env();
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}
