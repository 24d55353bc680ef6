use serde::{Deserialize, Serialize};

/// Settings that apply to every statement the router sees.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct General {
    /// SQL dialect spoken by the data sources. Decides how
    /// pagination is rewritten.
    ///
    /// _Default:_ `mysql`
    #[serde(default)]
    pub dialect: Dialect,

    /// Log the logical statement and every physical statement
    /// it was rewritten into.
    ///
    /// _Default:_ `false`
    #[serde(default)]
    pub log_sql: bool,

    /// Log output format.
    ///
    /// _Default:_ `text`
    #[serde(default)]
    pub log_format: LogFormat,

    /// Route range predicates on inline-sharded columns to every target
    /// instead of rejecting the statement.
    ///
    /// _Default:_ `false`
    #[serde(default)]
    pub allow_range_query_with_inline_sharding: bool,

    /// Data source for statements that don't touch any sharding or
    /// broadcast table. First declared data source if not set.
    #[serde(default)]
    pub default_data_source: Option<String>,
}

impl Default for General {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            log_sql: false,
            log_format: LogFormat::default(),
            allow_range_query_with_inline_sharding: false,
            default_data_source: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    #[default]
    Mysql,
    Postgres,
    Oracle,
    SqlServer,
}

impl Dialect {
    /// `LIMIT` dialects express the row count relative to the offset.
    /// `ROWNUM` and `TOP` express it as an absolute end row.
    pub fn row_count_is_relative(&self) -> bool {
        matches!(self, Self::Mysql | Self::Postgres)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mysql => write!(f, "mysql"),
            Self::Postgres => write!(f, "postgres"),
            Self::Oracle => write!(f, "oracle"),
            Self::SqlServer => write!(f, "sql_server"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
