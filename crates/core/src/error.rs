//! Crate-wide error type
//!
//! Mirrors the error-kind taxonomy in spec §7: invalid input, auth
//! failure, transient/permanent external-API errors, capacity, disconnect,
//! and fatal-internal. Call sites match on the variant to decide retry vs.
//! drop vs. terminate rather than parsing an error string.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transient external error: {0}")]
    Transient(String),

    #[error("permanent external error: {0}")]
    Permanent(String),

    #[error("capacity exceeded: {0}")]
    Capacity(String),

    #[error("session disconnected: {0}")]
    Disconnect(String),

    #[error("fatal internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error kind should be retried with backoff (spec §4.3,
    /// §7 "transient external").
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}
