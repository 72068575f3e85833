use anyhow::Result;
use api_server::{AppState, run_api_server};
use common::Config;
use dotenvy::dotenv;
use storage::{MemoryStore, Storage, ViewCountStore};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = common::logging_stdout();
    dotenv().ok();

    let config = Config::from_env()?;
    info!(
        ttl = ?config.cache.ttl,
        prune_interval = ?config.cache.prune_interval,
        "view count cache configured"
    );

    match &config.database {
        Some(db) => {
            let storage = Storage::new(db).await?;
            serve(&config, storage).await
        }
        None => {
            warn!("DATABASE_URL not set, view counts are kept in memory only");
            if config.seed.is_empty() {
                warn!("no SEED_COMMUNITIES or SEED_THREADS given, every view will be rejected");
            }
            serve(&config, MemoryStore::new()).await
        }
    }
}

async fn serve<S: ViewCountStore>(config: &Config, store: S) -> Result<()> {
    let state = AppState::from_config(store, config).await?;
    let mut prune_job = state.cache.start()?;

    let result = tokio::select! {
        served = run_api_server(config.api_addr, state) => served.map_err(anyhow::Error::from),
        signal = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            signal.map_err(anyhow::Error::from)
        }
    };

    prune_job.stop().await;
    if let Err(e) = &result {
        error!("{e}");
    }
    result
}
