use std::{net::SocketAddr, sync::Arc};

use server_api::ApiContext;
use storage::Storage;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod extract;
mod routes;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

const EVENT_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState::new(ApiContext { storage }, EVENT_CAPACITY);
    let app = routes::build_router(Arc::new(state), settings.body_limit_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, body_limit = settings.body_limit_bytes, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
