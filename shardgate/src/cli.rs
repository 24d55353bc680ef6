use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::config::Config;
use crate::router::sharding::{self, ShardingRule};
use crate::router::{self, Router};
use crate::unique_id::KeyGenerators;

/// Shardgate routes and rewrites SQL for sharded databases.
#[derive(Parser, Debug)]
#[command(name = "", version = concat!("Shardgate v", env!("CARGO_PKG_VERSION")))]
pub struct Cli {
    /// Path to the configuration file. Default: "shardgate.toml"
    #[arg(short, long, default_value = "shardgate.toml")]
    pub config: PathBuf,
    /// Subcommand.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Check the configuration file for errors.
    Configcheck,

    /// Print the actual data nodes of a table.
    Nodes {
        /// Logical table name.
        #[arg(short, long)]
        table: String,
    },

    /// Generate keys for a table with a key generator.
    GenerateKey {
        /// Logical table name.
        #[arg(short, long)]
        table: String,

        /// Number of keys.
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Rule(#[from] sharding::Error),

    #[error("{0}")]
    Router(#[from] router::Error),

    #[error("\"{0}\" is not a sharded table")]
    UnknownTable(String),
}

/// Confirm the configuration file parses and builds a valid rule.
pub fn config_check(config: &Config) -> Result<ShardingRule, Error> {
    Ok(ShardingRule::new(config, &KeyGenerators::new())?)
}

/// Actual data nodes of `table`, as `data_source.table`.
pub fn nodes(config: &Config, table: &str) -> Result<Vec<String>, Error> {
    let rule = config_check(config)?;
    let table = rule
        .table(table)
        .ok_or_else(|| Error::UnknownTable(table.to_string()))?;

    Ok(table
        .data_nodes
        .iter()
        .map(|node| format!("{}.{}", node.data_source, node.table))
        .collect())
}

pub async fn generate_keys(config: &Config, table: &str, count: usize) -> Result<Vec<String>, Error> {
    let router = Router::new(config)?;
    Ok(router
        .generate_keys(table, count)
        .await?
        .into_iter()
        .map(|key| key.to_string())
        .collect())
}
