//! Configuration errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Toml(#[from] toml::de::Error),

    #[error("config parse error: {message} (line {line})")]
    Parse { message: String, line: usize },

    #[error("property \"{name}\" has invalid value \"{value}\"")]
    InvalidProperty { name: String, value: String },

    #[error("data source \"{0}\" is declared twice")]
    DuplicateDataSource(String),

    #[error("table \"{0}\" is declared twice")]
    DuplicateTable(String),

    #[error("default data source \"{0}\" is not declared")]
    UnknownDefaultDataSource(String),
}

impl Error {
    /// Build a parse error pointing at the line that failed,
    /// which toml only reports as a byte span.
    pub fn config(source: &str, err: toml::de::Error) -> Self {
        let line = err
            .span()
            .map(|span| source[..span.start.min(source.len())].lines().count().max(1))
            .unwrap_or(0);

        Self::Parse {
            message: err.message().to_string(),
            line,
        }
    }
}
