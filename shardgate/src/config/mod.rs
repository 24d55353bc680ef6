//! Process-wide configuration snapshot.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::info;

pub use shardgate_config::{Config, Error};

static CONFIG: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from_pointee(Config::default()));

static LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Load configuration.
pub fn config() -> Arc<Config> {
    CONFIG.load().clone()
}

/// Load the configuration file from disk.
pub fn load(path: impl AsRef<Path>) -> Result<Arc<Config>, Error> {
    let _lock = LOCK.lock();
    let config = Config::load(path)?;
    Ok(set(config))
}

pub fn set(config: Config) -> Arc<Config> {
    let config = Arc::new(config);
    CONFIG.store(config.clone());
    info!(
        "configuration set: {} data sources, {} sharded tables",
        config.data_sources.len(),
        config.sharding.tables.len()
    );
    config
}
