pub mod config;
pub mod error;

mod log;

pub use config::{CacheConfig, Config, DatabaseConfig, SeedConfig};
pub use log::logging_stdout;
