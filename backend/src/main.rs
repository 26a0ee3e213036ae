use std::sync::Arc;

mod accounting;
mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod property;
mod schema;
mod storage;
mod transaction;

use config::{AppConfig, StorageBackend};
use storage::{MemStorage, PgStorage, Storage};

fn build_store(config: &AppConfig) -> Result<Arc<dyn Storage>, Box<dyn std::error::Error>> {
    let store: Arc<dyn Storage> = match config.storage {
        StorageBackend::Memory => {
            log::info!("Using in-memory storage");
            Arc::new(MemStorage::new(config.policy()))
        }
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL must be set when STORAGE=postgres")?;
            let pool = db::establish_pool(url, config.database_pool_size)?;
            Arc::new(PgStorage::new(pool, config.policy()))
        }
    };
    if config.seed_sample_data {
        storage::seed::seed(store.as_ref())?;
    }
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let config = AppConfig::load()?;
    log::info!("Loaded config: {:?}", config);

    let store = tokio::task::spawn_blocking({
        let config = config.clone();
        move || build_store(&config).map_err(|e| e.to_string())
    })
    .await??;

    let addr = format!("{}:{}", config.host, config.port);
    let state = handlers::AppState {
        config: Arc::new(config),
        store,
    };
    let app = handlers::router(state);

    log::info!("Starting server on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app.into_make_service()).await?;

    Ok(())
}
