//! Error taxonomy for the collector.

use thiserror::Error;

use crate::payload::FieldErrors;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid payload: {0}")]
    InvalidPayload(FieldErrors),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no snapshot stored yet")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] StoreError),
}
