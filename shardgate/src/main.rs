//! Shardgate, SQL router for sharded databases.

use std::process::exit;

use clap::Parser;
use tracing::{error, info};

use shardgate::cli::{self, Cli, Commands};
use shardgate::{config, logger};

#[allow(clippy::print_stdout)]
#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let config = match config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            logger::init(Default::default());
            error!("{}", err);
            exit(1);
        }
    };
    logger::init(config.general.log_format);

    let result = match args.command {
        Commands::Configcheck => cli::config_check(&config).map(|rule| {
            info!(
                "\"{}\" is valid ({} sharded tables, dialect {})",
                args.config.display(),
                rule.tables.len(),
                rule.dialect
            );
        }),

        Commands::Nodes { table } => cli::nodes(&config, &table).map(|nodes| {
            for node in nodes {
                println!("{}", node);
            }
        }),

        Commands::GenerateKey { table, count } => cli::generate_keys(&config, &table, count)
            .await
            .map(|keys| {
                for key in keys {
                    println!("{}", key);
                }
            }),
    };

    if let Err(err) = result {
        error!("{}", err);
        exit(1);
    }
}
