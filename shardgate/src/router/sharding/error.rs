use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("inline expression \"{expression}\": {reason}")]
    InlineSyntax { expression: String, reason: String },

    #[error("inline expression \"{expression}\": {reason}")]
    InlineEvaluation { expression: String, reason: String },

    #[error("data node \"{0}\" must be in the form \"data_source.table\"")]
    InvalidDataNode(String),

    #[error("table \"{table}\" uses unknown data source \"{data_source}\"")]
    UnknownDataSource { table: String, data_source: String },

    #[error("table \"{0}\" has no data nodes")]
    NoDataNodes(String),

    #[error("binding group {group:?}: {reason}")]
    InvalidBindingGroup { group: Vec<String>, reason: String },

    #[error("table \"{0}\" is both sharded and broadcast")]
    ShardedBroadcastTable(String),

    #[error("algorithm \"{algorithm}\" can't shard value {value}")]
    InvalidValue { algorithm: &'static str, value: String },

    #[error("algorithm \"{0}\" needs a positive count")]
    InvalidCount(&'static str),

    #[error("inline strategy on \"{0}\" can't route a range, set allow_range_query_with_inline_sharding to route it everywhere")]
    RangeNotSupported(String),

    #[error("key generator: {0}")]
    KeyGenerator(#[from] crate::unique_id::Error),
}
