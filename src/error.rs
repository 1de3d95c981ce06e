use std::result::Result as StdResult;

/// Errors raised while building the metrics layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An endpoint path could not be compiled into an anchored matcher.
    #[error("invalid endpoint pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    /// Histogram boundaries are empty, not finite or not strictly increasing.
    #[error("invalid buckets for `{name}`: boundaries must be finite and strictly increasing")]
    InvalidBuckets { name: &'static str },
}

pub type Result<T, E = Error> = StdResult<T, E>;
