use thiserror::Error;

use crate::{query::error::QueryError, session::SessionError};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("{0}")]
    SessionError(#[from] SessionError),
    #[error("{0}")]
    QueryError(#[from] QueryError),
    #[error("json encoding error `{0}`")]
    JsonEncodingError(String),
    #[error("{failed} of {total} sensors failed to sync")]
    SyncFailed { failed: usize, total: usize },
}

impl From<serde_json::Error> for DispatchError {
    fn from(value: serde_json::Error) -> Self {
        Self::JsonEncodingError(value.to_string())
    }
}
