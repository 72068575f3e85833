use cache::ViewCountCache;
use common::{Config, SeedConfig};
use error::{Error, Result};
use std::net::SocketAddr;
use storage::ViewCountStore;
use tracing::info;
use volo_http::Address;
use volo_http::server::{Router, Server};
use volo_http::utils::Extension;

pub mod error;
pub mod handlers;
pub mod requests;

/// Everything a request handler needs, injected as a router extension.
#[derive(Clone)]
pub struct AppState<S> {
    pub store: S,
    pub cache: ViewCountCache,
}

impl<S: ViewCountStore> AppState<S> {
    pub fn new(store: S, cache: ViewCountCache) -> Self {
        Self { store, cache }
    }

    /// Seeds `store` and builds the cache from `config`, as the binary does at
    /// start-up.
    pub async fn from_config(store: S, config: &Config) -> Result<Self> {
        seed_store(&store, &config.seed).await?;
        Ok(Self::new(store, ViewCountCache::from_config(&config.cache)))
    }
}

/// Registers the seeded communities and creates zeroed counters for the
/// seeded threads. Existing rows are left as they are.
pub async fn seed_store<S: ViewCountStore>(store: &S, seed: &SeedConfig) -> Result<()> {
    let communities = seed
        .communities
        .iter()
        .map(String::as_str)
        .chain(seed.threads.iter().map(|(community, _)| community.as_str()));
    for community in communities {
        store.add_community(community).await?;
    }
    for (community, object_id) in &seed.threads {
        store.init_view_count(community, object_id).await?;
    }
    if !seed.is_empty() {
        info!(
            communities = seed.communities.len(),
            threads = seed.threads.len(),
            "store seeded"
        );
    }
    Ok(())
}

pub async fn run_api_server<S: ViewCountStore>(addr: SocketAddr, state: AppState<S>) -> Result<()> {
    let app = Router::new()
        .merge(handlers::view_count_router::<S>())
        .layer(Extension(state));
    info!(addr = %addr, "api server listening");
    let addr = Address::from(addr);
    Server::new(app)
        .run(addr)
        .await
        .map_err(|e| Error::Server(e.to_string().into()))
}
