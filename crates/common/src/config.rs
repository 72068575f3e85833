use crate::error::{Error, Result};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 19981));
pub const DEFAULT_VIEW_COUNT_TTL_SECS: u64 = 2 * 60;
pub const DEFAULT_VIEW_COUNT_PRUNE_INTERVAL_SECS: u64 = 10 * 60;
pub const DEFAULT_DB_HEALTH_INTERVAL_SECS: u64 = 120;
pub const DEFAULT_DB_HEALTH_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a recorded view suppresses further counting for the same viewer.
    pub ttl:            Duration,
    /// How often expired entries are physically removed.
    pub prune_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl:            Duration::from_secs(DEFAULT_VIEW_COUNT_TTL_SECS),
            prune_interval: Duration::from_secs(DEFAULT_VIEW_COUNT_PRUNE_INTERVAL_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url:             String,
    pub health_interval: Duration,
    pub health_timeout:  Duration,
}

/// Communities and threads registered at start-up. Seeding is idempotent, so
/// it is applied to the database as well as the in-memory store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedConfig {
    pub communities: Vec<String>,
    /// `(community, object_id)` pairs whose counter starts at zero.
    pub threads:     Vec<(String, String)>,
}

impl SeedConfig {
    pub fn is_empty(&self) -> bool {
        self.communities.is_empty() && self.threads.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_addr: SocketAddr,
    /// `None` runs the service against the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub cache:    CacheConfig,
    pub seed:     SeedConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup, `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_addr = parse_or(&lookup, "API_ADDR", || DEFAULT_API_ADDR)?;

        let cache = CacheConfig {
            ttl:            secs_or(&lookup, "VIEW_COUNT_TTL_SECS", DEFAULT_VIEW_COUNT_TTL_SECS)?,
            prune_interval: secs_or(
                &lookup,
                "VIEW_COUNT_PRUNE_INTERVAL_SECS",
                DEFAULT_VIEW_COUNT_PRUNE_INTERVAL_SECS,
            )?,
        };

        let database = match lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()) {
            Some(url) => Some(DatabaseConfig {
                url,
                health_interval: secs_or(
                    &lookup,
                    "DB_HEALTH_INTERVAL_SECS",
                    DEFAULT_DB_HEALTH_INTERVAL_SECS,
                )?,
                health_timeout: secs_or(
                    &lookup,
                    "DB_HEALTH_TIMEOUT_SECS",
                    DEFAULT_DB_HEALTH_TIMEOUT_SECS,
                )?,
            }),
            None => None,
        };

        let seed = SeedConfig {
            communities: list(&lookup, "SEED_COMMUNITIES"),
            threads:     list(&lookup, "SEED_THREADS")
                .into_iter()
                .map(|entry| match entry.split_once(':') {
                    Some((community, object_id))
                        if !community.trim().is_empty() && !object_id.trim().is_empty() =>
                    {
                        Ok((community.trim().to_owned(), object_id.trim().to_owned()))
                    }
                    _ => Err(Error::InvalidConfig {
                        key:   "SEED_THREADS",
                        value: entry.clone(),
                    }),
                })
                .collect::<Result<_>>()?,
        };

        Ok(Self {
            api_addr,
            database,
            cache,
            seed,
        })
    }
}

/// Comma separated, blank items skipped.
fn list<F>(lookup: &F, key: &str) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_or<F, T, D>(lookup: &F, key: &'static str, default: D) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    D: FnOnce() -> T,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| Error::InvalidConfig { key, value }),
        None => Ok(default()),
    }
}

fn secs_or<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse_or(lookup, key, || default)?;
    if secs == 0 {
        return Err(Error::ZeroDuration { key });
    }
    Ok(Duration::from_secs(secs))
}
