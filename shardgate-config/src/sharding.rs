use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::KeyGeneratorConfig;

/// Sharding rules.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct Sharding {
    /// Logical tables split across data sources.
    #[serde(default)]
    pub tables: Vec<ShardedTable>,
    /// Groups of tables that always route together,
    /// e.g. `[["t_order", "t_order_item"]]`.
    #[serde(default)]
    pub binding_tables: Vec<Vec<String>>,
    /// Tables replicated to every data source.
    #[serde(default)]
    pub broadcast_tables: Vec<String>,
    /// Database strategy for tables that don't declare one.
    #[serde(default)]
    pub default_database_strategy: Option<Strategy>,
    /// Table strategy for tables that don't declare one.
    #[serde(default)]
    pub default_table_strategy: Option<Strategy>,
    /// Key generator for tables that don't declare one.
    #[serde(default)]
    pub default_key_generator: Option<KeyGeneratorConfig>,
}

/// Sharded (logical) table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ShardedTable {
    /// Logical table name.
    pub name: String,
    /// Physical tables, e.g. `ds_${0..1}.t_user_${0..3}`. If not set,
    /// the table lives under its own name in every data source.
    #[serde(default)]
    pub actual_data_nodes: Option<String>,
    #[serde(default)]
    pub database_strategy: Option<Strategy>,
    #[serde(default)]
    pub table_strategy: Option<Strategy>,
    #[serde(default)]
    pub key_generator: Option<KeyGeneratorConfig>,
}

/// How a sharding dimension (database or table) picks its targets.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Strategy {
    /// Inline expression over one column, e.g. `ds_${user_id % 2}`.
    Inline { column: String, expression: String },
    /// Built-in algorithm over one column.
    Standard { column: String, algorithm: Algorithm },
    /// Inline expression over several columns.
    Complex {
        columns: Vec<String>,
        expression: String,
    },
    /// Inline expression over hinted values, bound to `value`.
    Hint { expression: String },
    /// No sharding: the first declared target.
    None,
}

impl Strategy {
    /// Columns this strategy reads.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Self::Inline { column, .. } | Self::Standard { column, .. } => vec![column.as_str()],
            Self::Complex { columns, .. } => columns.iter().map(|c| c.as_str()).collect(),
            Self::Hint { .. } | Self::None => vec![],
        }
    }
}

/// Built-in algorithms for the `standard` strategy.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Algorithm {
    /// `value % count`, matched against the target's numeric suffix.
    Mod { count: u64 },
    /// `hash(value) % count`, matched against the target's numeric suffix.
    HashMod { count: u64 },
    /// Target `n` holds `[boundaries[n - 1], boundaries[n])`.
    BoundaryRange { boundaries: Vec<i64> },
}

/// Shadow traffic: rows flagged by `column` go to the mapped data sources
/// and the flag column itself never reaches the database.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct Shadow {
    pub column: String,
    #[serde(default)]
    pub mappings: HashMap<String, String>,
}
