mod config;
mod error;
mod routes;

use std::sync::Arc;

use config::AppConfig;
use routes::{app_router, AppState};
use tourney_core::services::PublicationStore;
use tourney_core::sync::SyncEngine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tourney_api=info".parse().expect("valid directive"))
                .add_directive("tourney_core=info".parse().expect("valid directive")),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting tourney-api with config: {:?}", config);

    let store = PublicationStore::open_path(&config.database_path).await?;
    let engine = SyncEngine::from_config(store.clone(), &config.engine)?;
    if let Some(engine) = &engine {
        engine.scheduler().start();
    }

    let state = AppState::new(config, store, engine);
    let bind_addr = state.config.bind_addr.clone();
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("tourney-api listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
