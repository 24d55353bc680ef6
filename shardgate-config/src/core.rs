use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::read_to_string;
use std::path::Path;
use tracing::{info, warn};

use super::error::Error;
use super::general::General;
use super::sharding::{Shadow, Sharding};

/// Configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// General configuration.
    #[serde(default)]
    pub general: General,

    /// Data sources, in declaration order.
    #[serde(default)]
    pub data_sources: Vec<String>,

    /// Sharding rules.
    #[serde(default)]
    pub sharding: Sharding,

    /// Shadow traffic.
    #[serde(default)]
    pub shadow: Option<Shadow>,
}

impl Config {
    /// Load configuration from disk or use defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();

        let config = if let Ok(source) = read_to_string(path) {
            let config = Self::from_toml(&source)?;
            info!("loaded \"{}\"", path.display());
            config
        } else {
            warn!(
                "\"{}\" doesn't exist, loading defaults instead",
                path.display()
            );
            Config::default()
        };

        Ok(config)
    }

    /// Parse and check configuration text.
    pub fn from_toml(source: &str) -> Result<Self, Error> {
        let config: Config = match toml::from_str(source) {
            Ok(config) => config,
            Err(err) => return Err(Error::config(source, err)),
        };
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), Error> {
        let mut seen = HashSet::new();
        for data_source in &self.data_sources {
            if !seen.insert(data_source.as_str()) {
                return Err(Error::DuplicateDataSource(data_source.clone()));
            }
        }

        if let Some(default) = &self.general.default_data_source {
            if !seen.contains(default.as_str()) {
                return Err(Error::UnknownDefaultDataSource(default.clone()));
            }
        }

        let mut seen = HashSet::new();
        for table in &self.sharding.tables {
            if !seen.insert(table.name.to_lowercase()) {
                return Err(Error::DuplicateTable(table.name.clone()));
            }
        }

        Ok(())
    }

    /// Data source for unsharded statements.
    pub fn default_data_source(&self) -> Option<&str> {
        self.general
            .default_data_source
            .as_deref()
            .or_else(|| self.data_sources.first().map(|ds| ds.as_str()))
    }
}
