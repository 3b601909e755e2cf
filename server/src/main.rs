//! Estate CRM HTTP server.
//!
//! Run from repo root: `cargo run -p estate-crm-server`

use estate_crm::{app, ensure_database_exists, prepare, AppState, Catalog, PgStore, Settings};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("estate_crm=info")),
        )
        .init();

    let settings = Settings::load()?;
    ensure_database_exists(&settings.database_url).await?;
    let store = PgStore::connect(&settings.database_url, settings.max_connections, &settings.schema).await?;

    let catalog = Arc::new(Catalog::standard()?);
    let report = prepare(&store, &catalog).await?;
    tracing::info!(applied = ?report.ids(), "schema ready");

    let state = AppState::new(Arc::new(store), catalog);
    let listener = TcpListener::bind(settings.listen_addr).await?;
    tracing::info!("estate-crm listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app(state, settings.body_limit_bytes)).await?;
    Ok(())
}
