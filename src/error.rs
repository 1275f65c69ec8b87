//! Error taxonomy shared by the repository, matching core and HTTP layer.
//! "No match" is never an error: absence from the hints map represents it.

use thiserror::Error;

/// Failure of the backing store. Every repository operation maps its
/// driver errors into this single condition.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(e: rusqlite::Error) -> Self {
        RepositoryError::Unavailable(e.to_string())
    }
}

impl From<r2d2::Error> for RepositoryError {
    fn from(e: r2d2::Error) -> Self {
        RepositoryError::Unavailable(format!("connection pool: {e}"))
    }
}

/// Errors surfaced by hint composition, ingestion and leverage analysis.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Missing or malformed target language / brand id. Raised before any lookup.
    #[error("invalid scope: {0}")]
    InvalidScope(String),
    #[error(transparent)]
    RepositoryUnavailable(#[from] RepositoryError),
    /// The overall request deadline elapsed; partial hints were discarded.
    #[error("lookup timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}
