// GeoAssist - Web Server
// REST API over the local place cache

use anyhow::{Context, Result};
use geoassist::{api, AppConfig, PlaceSource, PlaceStore};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    println!("🌐 GeoAssist - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = AppConfig::load()?;
    let mut store = PlaceStore::open(&config.database_path)?;
    println!("✓ Database opened: {:?}", config.database_path);

    let source: Arc<dyn PlaceSource> = Arc::from(config.build_source());

    // Seed an empty cache so the first request has something to rank
    if store.count()? == 0 {
        let seed = source.clone();
        match tokio::task::spawn_blocking(move || seed.fetch()).await? {
            Ok(places) => {
                let stats = store.apply_refresh(&source.describe(), &places)?;
                info!(inserted = stats.inserted, "seeded empty place cache");
            }
            Err(e) => warn!(error = %e, "could not seed place cache"),
        }
    }

    let app = api::router(api::AppState::new(store, source));

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;

    println!("\n🚀 Server running on http://{}", config.bind_address);
    println!("   API: http://{}/api/places?lat=40.7347&lon=-73.9990", config.bind_address);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
