use thiserror::Error;

use crate::{
    block::{BlockId, error::CodecError},
    catalog::error::CatalogError,
    store::error::StoreError,
};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("sensor `{0}` is not registered")]
    UnknownSensor(String),
    #[error("transport error `{0}`")]
    TransportError(#[from] CatalogError),
    #[error("block {}/{}/{} rejected `{source}`", .id.rid, .id.lvl, .id.bid)]
    BlockRejected {
        id: BlockId,
        #[source]
        source: CodecError,
    },
    #[error("store error `{0}`")]
    StoreError(#[from] StoreError),
}
