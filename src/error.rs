use thiserror::Error;

/// Errors surfaced by the core list operations.
///
/// `NotFound` covers stale or replayed references (a button pointing at a
/// purged batch, an expired session token). `ParsingFailed` is an
/// all-or-nothing failure of the AI call; no partial items are committed.
/// Store errors propagate uncaught to the handler boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found")]
    NotFound,
    #[error("parsing failed: {0}")]
    ParsingFailed(String),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
