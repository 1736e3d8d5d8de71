//! Chorus server binary: binds the HTTP/WebSocket API over a shared
//! catalog store.

use std::sync::Arc;

use tracing::info;

use chorus::catalog::Catalog;
use chorus::config::Settings;
use chorus::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = Settings::from_env()?;
    std::fs::create_dir_all(&settings.songs_dir)?;

    let catalog = Catalog::open(&settings.database_path).await?;
    let stats = catalog.stats().await?;
    info!(
        songs = stats.songs,
        fingerprints = stats.fingerprints,
        "catalog ready"
    );

    let state = AppState {
        catalog,
        settings: Arc::new(settings.clone()),
    };
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr()).await?;
    info!(address = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let filter = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
