//! Query router.
//!
//! Takes a bound statement and the sharding rule, decides which data
//! nodes it runs on and produces the physical SQL for each of them.

pub mod check;
pub mod error;
pub mod extract;
pub mod hint;
pub mod pagination;
pub mod rewrite;
pub mod route;
pub mod sharding;
pub mod statement;

#[cfg(test)]
pub mod test;

use std::sync::Arc;

use arc_swap::ArcSwap;
use shardgate_config::Config;
use tracing::{debug, info, warn};

pub use error::Error;
pub use extract::ShardingCondition;
pub use hint::Hints;
pub use pagination::PaginationContext;
pub use rewrite::SqlUnit;
pub use route::{GeneratedKeys, RoutingResult, RoutingUnit, TableMapping};
pub use sharding::ShardingRule;
pub use statement::{Statement, StatementBuilder, StatementKind, Value};

use crate::unique_id::{GeneratedKey, KeyGenerators};

/// Router over a swappable rule snapshot.
#[derive(Debug)]
pub struct Router {
    rule: ArcSwap<ShardingRule>,
    generators: KeyGenerators,
}

impl Router {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let generators = KeyGenerators::new();
        let rule = ShardingRule::new(config, &generators).map_err(Error::Configuration)?;

        Ok(Self {
            rule: ArcSwap::from_pointee(rule),
            generators,
        })
    }

    /// Build a new rule and swap it in. Statements already routed keep
    /// the snapshot they started with. On error, the current rule stays.
    pub fn reload(&self, config: &Config) -> Result<(), Error> {
        let rule = ShardingRule::new(config, &self.generators).map_err(Error::Configuration)?;
        self.rule.store(Arc::new(rule));
        info!("sharding rule reloaded");
        Ok(())
    }

    /// Current rule snapshot.
    pub fn rule(&self) -> Arc<ShardingRule> {
        self.rule.load_full()
    }

    /// Route a statement. `hints` win over comment hints in the SQL,
    /// which win over the statement's own predicates.
    pub async fn route(&self, statement: &Statement, hints: &Hints) -> Result<RoutingResult, Error> {
        let rule = self.rule();

        let mut merged = Hints::from_comments(&statement.sql);
        merged.merge(hints.clone());

        check::check(statement, &rule)?;

        let generated_keys = generate_keys(statement, &rule).await?;
        let conditions = extract::extract(statement, &rule, &merged, generated_keys.as_ref())?;
        let mut units = route::route(statement, &rule, &conditions, &merged)?;

        let shadow = route::is_shadow(statement, &rule)?;
        if shadow {
            route::shadow(&mut units, &rule)?;
        }

        let pagination = PaginationContext::new(statement, rule.dialect)?;

        debug!(
            "{} unit{}{} [{:?}]",
            units.len(),
            if units.len() == 1 { "" } else { "s" },
            if shadow { " (shadow)" } else { "" },
            units
                .iter()
                .map(|unit| unit.data_source.as_str())
                .collect::<Vec<_>>()
        );

        Ok(RoutingResult {
            units,
            pagination,
            generated_keys,
            shadow,
            rule,
        })
    }

    /// Physical statement for one unit of a routing result.
    pub fn rewrite(
        &self,
        statement: &Statement,
        result: &RoutingResult,
        unit: &RoutingUnit,
    ) -> Result<SqlUnit, Error> {
        Ok(rewrite::rewrite(statement, result, unit)?)
    }

    /// Route and rewrite. Fails as a whole if any unit fails.
    pub async fn plan(&self, statement: &Statement, hints: &Hints) -> Result<Vec<SqlUnit>, Error> {
        let result = self.route(statement, hints).await?;

        let units = result
            .units
            .iter()
            .map(|unit| self.rewrite(statement, &result, unit))
            .collect::<Result<Vec<_>, _>>()?;

        if result.rule.log_sql {
            info!("logic sql: {}", statement.sql);
            for unit in &units {
                info!(
                    "actual sql: {} ::: {} ::: {:?}",
                    unit.data_source, unit.sql, unit.parameters
                );
            }
        }

        Ok(units)
    }

    /// Generate a key for a table with a key generator.
    pub async fn generate_key(&self, table: &str) -> Result<GeneratedKey, Error> {
        let mut keys = self.generate_keys(table, 1).await?;
        keys.pop().ok_or_else(|| Error::NoRoute(table.to_string()))
    }

    /// Generate `count` keys for a table with a key generator.
    pub async fn generate_keys(&self, table: &str, count: usize) -> Result<Vec<GeneratedKey>, Error> {
        let rule = self.rule();
        let key = rule
            .table(&table.to_lowercase())
            .and_then(|table| table.key_generator.clone())
            .ok_or_else(|| Error::unsupported(format!("no key generator for \"{}\"", table)))?;

        Ok(key.generator.next_keys(count).await?)
    }
}

/// Keys for an INSERT that left the key column out.
async fn generate_keys(
    statement: &Statement,
    rule: &ShardingRule,
) -> Result<Option<GeneratedKeys>, Error> {
    if statement.kind != StatementKind::Insert {
        return Ok(None);
    }
    let Some(insert) = &statement.insert else {
        return Ok(None);
    };
    let Some(table) = statement.table_names().into_iter().next() else {
        return Ok(None);
    };
    let Some(key) = rule.table(&table).and_then(|table| table.key_generator.as_ref()) else {
        return Ok(None);
    };

    if insert.column_index(&key.column).is_some() {
        return Ok(None);
    }
    if insert.columns_stop.is_none() {
        warn!(
            "INSERT into \"{}\" has no column list, not generating \"{}\"",
            table, key.column
        );
        return Ok(None);
    }

    let keys = key.generator.next_keys(insert.rows.len()).await?;

    Ok(Some(GeneratedKeys {
        column: key.column.clone(),
        keys,
    }))
}
