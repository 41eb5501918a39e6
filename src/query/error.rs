use thiserror::Error;

use crate::{block::error::CodecError, catalog::error::CatalogError, store::error::StoreError};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("time format not supported `{0}`, use epochs or a timestamp with offset")]
    UnsupportedTimeFormat(String),
    #[error("sensor `{0}` is not registered")]
    UnknownSensor(String),
    #[error("store error `{0}`")]
    StoreError(#[from] StoreError),
    #[error("block error `{0}`")]
    CodecError(#[from] CodecError),
    #[error("transport error `{0}`")]
    TransportError(#[from] CatalogError),
}
