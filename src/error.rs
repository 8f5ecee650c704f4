use thiserror::Error;

use crate::feed::{FetchError, ParseError};
use crate::shutdown::Canceled;
use crate::storage::DatabaseError;
use crate::util::UrlValidationError;

/// Domain errors surfaced by the service layer.
///
/// Store-level `NotFound`/`AlreadyExists` are lifted into their own variants so
/// commands can branch on them without reaching into `DatabaseError`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("not a valid feed")]
    NotAValidFeed,

    /// The feed host answered with a non-2xx status
    #[error("feed returned HTTP {status}")]
    Http { status: u16 },

    /// The feed has no stored articles yet
    #[error("feed has no articles")]
    EmptyFeed,

    #[error(transparent)]
    InvalidUrl(#[from] UrlValidationError),

    #[error("operation canceled")]
    Canceled,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Database(DatabaseError),
}

impl From<DatabaseError> for Error {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound => Error::NotFound,
            DatabaseError::AlreadyExists => Error::AlreadyExists,
            other => Error::Database(other),
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        tracing::debug!(error = %err, "Rejected feed body");
        Error::NotAValidFeed
    }
}

impl From<Canceled> for Error {
    fn from(_: Canceled) -> Self {
        Error::Canceled
    }
}

/// Coarse classification of a feed host's HTTP failure, for user-facing replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpCategory {
    AuthRequired,
    Forbidden,
    NotFound,
    ServerError,
    Other,
}

impl HttpCategory {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => HttpCategory::AuthRequired,
            403 => HttpCategory::Forbidden,
            404 => HttpCategory::NotFound,
            s if s >= 500 => HttpCategory::ServerError,
            _ => HttpCategory::Other,
        }
    }
}

impl Error {
    /// `Some` only for [`Error::Http`].
    pub fn http_category(&self) -> Option<HttpCategory> {
        match self {
            Error::Http { status } => Some(HttpCategory::from_status(*status)),
            _ => None,
        }
    }
}
