//! Router error.

use thiserror::Error;

use super::rewrite;
use super::sharding;
use crate::unique_id;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration: {0}")]
    Configuration(sharding::Error),

    #[error("{0}")]
    Sharding(#[from] sharding::Error),

    #[error("unsupported: {0}")]
    UnsupportedOperation(String),

    #[error("binding tables {tables:?} route to different data nodes")]
    InconsistentRouting { tables: Vec<String> },

    #[error("no data node of \"{0}\" matches the statement")]
    NoRoute(String),

    #[error("tables {0:?} don't share a data source")]
    NoCommonDataSource(Vec<String>),

    #[error("no default data source configured")]
    NoDataSource,

    #[error("missing parameter: ${0}")]
    MissingParameter(usize),

    #[error("{0}")]
    KeyGenerator(#[from] unique_id::Error),

    #[error("{0}")]
    Rewrite(#[from] rewrite::Error),
}

impl Error {
    pub(crate) fn unsupported(message: impl ToString) -> Self {
        Self::UnsupportedOperation(message.to_string())
    }

    /// Retrying the same statement later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::KeyGenerator(err) if err.is_retryable())
    }

    /// The statement can't run under the current rule.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedOperation(_) | Self::Sharding(sharding::Error::RangeNotSupported(_))
        )
    }
}
