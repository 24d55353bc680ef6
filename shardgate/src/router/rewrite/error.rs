use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("edit at {start}..={stop} overlaps an earlier edit")]
    OverlappingTokens { start: usize, stop: usize },

    #[error("edit at {start}..={stop} is outside the statement ({len} bytes)")]
    TokenOutOfBounds {
        start: usize,
        stop: usize,
        len: usize,
    },

    #[error("missing parameter: ${0}")]
    MissingParameter(usize),

    #[error("can't remove the only {0}")]
    UnsupportedRemoval(&'static str),
}
