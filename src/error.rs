//! Crate-wide error taxonomy.
//!
//! Four caller-visible classes plus infrastructure wrappers:
//!
//! - [`Error::Validation`] — rejected before any state mutation, no record
//!   is created or touched.
//! - [`Error::NotFound`] — missing session/artifact/file, or an ownership
//!   mismatch deliberately indistinguishable from a missing record.
//! - [`Error::Ingestion`] — a failure that has been captured onto the
//!   artifact record's `failed` state (clone error, empty repository,
//!   malformed archive); the record stays queryable for diagnosis.
//! - [`Error::Unsupported`] — the operation exists but not for this
//!   artifact kind/storage combination (e.g. download of a zip).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("ingestion failed: {0}")]
    Ingestion(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("metadata encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn ingestion(msg: impl Into<String>) -> Self {
        Error::Ingestion(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
