//! Sharding rule, built from configuration.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use shardgate_config::{Config, Dialect, ShardedTable, Strategy as StrategyConfig};
use tracing::{debug, info};

use super::inline::InlineExpression;
use super::strategy::Strategy;
use super::Error;
use crate::unique_id::{KeyGenerator, KeyGenerators};

/// One physical table in one data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: &str, table: &str) -> Self {
        Self {
            data_source: data_source.to_string(),
            table: table.to_string(),
        }
    }

    fn parse(node: &str) -> Result<Self, Error> {
        let node = node.trim();
        match node.split_once('.') {
            Some((data_source, table)) if !data_source.is_empty() && !table.is_empty() => {
                Ok(Self::new(data_source, table))
            }
            _ => Err(Error::InvalidDataNode(node.to_string())),
        }
    }
}

/// Parse `actual_data_nodes`: inline expressions separated by commas.
pub fn data_nodes(declaration: &str) -> Result<Vec<DataNode>, Error> {
    let mut nodes = vec![];
    for part in split_top_level(declaration) {
        for node in InlineExpression::parse(part.trim())?.expand()? {
            nodes.push(DataNode::parse(&node)?);
        }
    }
    Ok(nodes)
}

/// Split on commas outside of `${...}`.
fn split_top_level(input: &str) -> Vec<&str> {
    let mut parts = vec![];
    let mut depth = 0usize;
    let mut start = 0;

    for (pos, c) in input.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&input[start..pos]);
                start = pos + 1;
            }
            _ => (),
        }
    }
    parts.push(&input[start..]);

    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

/// Generator for a table's key column.
#[derive(Debug, Clone)]
pub struct KeyGeneratorRule {
    /// Column name, as configured.
    pub column: String,
    pub generator: Arc<KeyGenerator>,
}

/// Sharding rule for one logical table.
#[derive(Debug, Clone)]
pub struct TableRule {
    pub logic_table: String,
    pub data_nodes: Vec<DataNode>,
    pub database_strategy: Strategy,
    pub table_strategy: Strategy,
    pub key_generator: Option<KeyGeneratorRule>,
}

impl TableRule {
    /// Data sources holding this table, in declaration order.
    pub fn data_sources(&self) -> Vec<&str> {
        let mut data_sources: Vec<&str> = vec![];
        for node in &self.data_nodes {
            if !data_sources.contains(&node.data_source.as_str()) {
                data_sources.push(&node.data_source);
            }
        }
        data_sources
    }

    /// Actual tables in `data_source`, in declaration order.
    pub fn tables_in(&self, data_source: &str) -> Vec<&str> {
        self.data_nodes
            .iter()
            .filter(|node| node.data_source == data_source)
            .map(|node| node.table.as_str())
            .collect()
    }

    pub fn position(&self, data_source: &str, table: &str) -> Option<usize> {
        self.data_nodes
            .iter()
            .position(|node| node.data_source == data_source && node.table == table)
    }

    /// Columns either strategy shards on, lowercase.
    pub fn sharding_columns(&self) -> Vec<&str> {
        let mut columns = self.database_strategy.columns();
        for column in self.table_strategy.columns() {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        columns
    }

    pub fn is_sharding_column(&self, column: &str) -> bool {
        self.sharding_columns()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }

    pub fn is_key_column(&self, column: &str) -> bool {
        self.key_generator
            .as_ref()
            .is_some_and(|key| key.column.eq_ignore_ascii_case(column))
    }
}

/// Shadow routing: rows flagged by `column` go to the mapped data sources.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowRule {
    /// Lowercase.
    pub column: String,
    pub mappings: HashMap<String, String>,
}

/// Immutable routing configuration. Swapped as a whole on reload.
#[derive(Debug, Clone)]
pub struct ShardingRule {
    pub dialect: Dialect,
    pub data_sources: Vec<String>,
    pub default_data_source: Option<String>,
    /// By lowercase logical name.
    pub tables: IndexMap<String, TableRule>,
    /// Lowercase logical names.
    pub binding_groups: Vec<Vec<String>>,
    pub broadcast_tables: HashSet<String>,
    pub shadow: Option<ShadowRule>,
    pub allow_range_inline: bool,
    pub log_sql: bool,
}

impl ShardingRule {
    /// Build the rule. Key generators are taken from `generators`
    /// so they survive a reload.
    pub fn new(config: &Config, generators: &KeyGenerators) -> Result<Self, Error> {
        let sharding = &config.sharding;
        let default_database = sharding
            .default_database_strategy
            .as_ref()
            .map(Strategy::new)
            .transpose()?
            .unwrap_or_default();
        let default_table = sharding
            .default_table_strategy
            .as_ref()
            .map(Strategy::new)
            .transpose()?
            .unwrap_or_default();

        let mut tables = IndexMap::new();
        for table in &sharding.tables {
            let rule = Self::table_rule(
                config,
                table,
                &default_database,
                &default_table,
                generators,
            )?;
            debug!(
                "table \"{}\" has {} data nodes",
                rule.logic_table,
                rule.data_nodes.len()
            );
            tables.insert(table.name.to_lowercase(), rule);
        }

        let broadcast_tables: HashSet<String> = sharding
            .broadcast_tables
            .iter()
            .map(|t| t.to_lowercase())
            .collect();
        for table in &broadcast_tables {
            if tables.contains_key(table) {
                return Err(Error::ShardedBroadcastTable(table.clone()));
            }
        }

        let mut binding_groups = vec![];
        for group in &sharding.binding_tables {
            let group: Vec<String> = group.iter().map(|t| t.to_lowercase()).collect();
            Self::check_binding_group(&group, &tables)?;
            binding_groups.push(group);
        }

        let shadow = config.shadow.as_ref().map(|shadow| ShadowRule {
            column: shadow.column.to_lowercase(),
            mappings: shadow.mappings.clone(),
        });
        if let Some(shadow) = &shadow {
            for data_source in shadow.mappings.keys().chain(shadow.mappings.values()) {
                if !config.data_sources.contains(data_source) {
                    return Err(Error::UnknownDataSource {
                        table: format!("shadow.{}", shadow.column),
                        data_source: data_source.clone(),
                    });
                }
            }
        }

        let default_data_source = config.default_data_source().map(|ds| ds.to_string());
        if let Some(data_source) = &default_data_source {
            if !config.data_sources.contains(data_source) {
                return Err(Error::UnknownDataSource {
                    table: "general.default_data_source".into(),
                    data_source: data_source.clone(),
                });
            }
        }

        info!(
            "loaded sharding rule: {} sharded tables, {} binding groups, {} broadcast tables, {} data sources",
            tables.len(),
            binding_groups.len(),
            broadcast_tables.len(),
            config.data_sources.len()
        );

        Ok(Self {
            dialect: config.general.dialect,
            data_sources: config.data_sources.clone(),
            default_data_source,
            tables,
            binding_groups,
            broadcast_tables,
            shadow,
            allow_range_inline: config.general.allow_range_query_with_inline_sharding,
            log_sql: config.general.log_sql,
        })
    }

    fn table_rule(
        config: &Config,
        table: &ShardedTable,
        default_database: &Strategy,
        default_table: &Strategy,
        generators: &KeyGenerators,
    ) -> Result<TableRule, Error> {
        let data_nodes = match &table.actual_data_nodes {
            Some(declaration) => data_nodes(declaration)?,
            None => config
                .data_sources
                .iter()
                .map(|ds| DataNode::new(ds, &table.name))
                .collect(),
        };

        if data_nodes.is_empty() {
            return Err(Error::NoDataNodes(table.name.clone()));
        }

        for node in &data_nodes {
            if !config.data_sources.contains(&node.data_source) {
                return Err(Error::UnknownDataSource {
                    table: table.name.clone(),
                    data_source: node.data_source.clone(),
                });
            }
        }

        let strategy = |own: &Option<StrategyConfig>, default: &Strategy| match own {
            Some(config) => Strategy::new(config),
            None => Ok(default.clone()),
        };

        let key_generator = match table
            .key_generator
            .as_ref()
            .or(config.sharding.default_key_generator.as_ref())
        {
            Some(key) => {
                let namespace = format!("{}.{}", table.name.to_lowercase(), key.column);
                Some(KeyGeneratorRule {
                    column: key.column.clone(),
                    generator: generators.get_or_create(&namespace, key)?,
                })
            }
            None => None,
        };

        Ok(TableRule {
            logic_table: table.name.clone(),
            data_nodes,
            database_strategy: strategy(&table.database_strategy, default_database)?,
            table_strategy: strategy(&table.table_strategy, default_table)?,
            key_generator,
        })
    }

    fn check_binding_group(
        group: &[String],
        tables: &IndexMap<String, TableRule>,
    ) -> Result<(), Error> {
        let invalid = |reason: String| Error::InvalidBindingGroup {
            group: group.to_vec(),
            reason,
        };

        let mut first: Option<&TableRule> = None;
        for name in group {
            let rule = tables
                .get(name)
                .ok_or_else(|| invalid(format!("\"{}\" is not a sharded table", name)))?;

            if let Some(first) = first {
                if first.data_nodes.len() != rule.data_nodes.len() {
                    return Err(invalid(format!(
                        "\"{}\" and \"{}\" have a different number of data nodes",
                        first.logic_table, rule.logic_table
                    )));
                }
                let same_sources = first
                    .data_nodes
                    .iter()
                    .zip(&rule.data_nodes)
                    .all(|(a, b)| a.data_source == b.data_source);
                if !same_sources {
                    return Err(invalid(format!(
                        "\"{}\" and \"{}\" are spread over data sources differently",
                        first.logic_table, rule.logic_table
                    )));
                }
            } else {
                first = Some(rule);
            }
        }

        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&TableRule> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn is_broadcast(&self, name: &str) -> bool {
        self.broadcast_tables.contains(&name.to_lowercase())
    }

    /// Binding group `name` belongs to.
    pub fn binding_group(&self, name: &str) -> Option<&[String]> {
        let name = name.to_lowercase();
        self.binding_groups
            .iter()
            .find(|group| group.contains(&name))
            .map(|group| group.as_slice())
    }

    /// Table and column flagging shadow rows, if shadow routing is on.
    pub fn shadow_column(&self) -> Option<&str> {
        self.shadow.as_ref().map(|shadow| shadow.column.as_str())
    }
}
