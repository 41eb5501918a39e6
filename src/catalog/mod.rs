use std::{future::Future, sync::Arc};

use tokio::{sync::Semaphore, task::JoinSet};

use crate::block::{BlockDescriptor, BlockId};
use error::CatalogError;

pub mod error;
pub mod http;
pub mod memory;

/// Remote source of blocks.
///
/// Both calls authenticate with the sensor's opaque token. Any error is
/// fatal to the sync attempt that issued it.
pub trait Catalog: Send + Sync + 'static {
    /// Every block the remote holds at or beyond `cursor`.
    fn list_blocks(
        &self,
        sid: &str,
        token: &str,
        cursor: BlockId,
    ) -> impl Future<Output = Result<Vec<BlockDescriptor>, CatalogError>> + Send;

    /// Raw, still encoded payload of one block.
    fn fetch_block(
        &self,
        sid: &str,
        token: &str,
        block: &BlockDescriptor,
    ) -> impl Future<Output = Result<Vec<u8>, CatalogError>> + Send;
}

/// Fetches every payload, at most `workers` at a time, in completion order.
/// The first failure aborts the fetches still in flight.
pub async fn fetch_all<C: Catalog>(
    catalog: &Arc<C>,
    sid: &str,
    token: &str,
    blocks: Vec<BlockDescriptor>,
    workers: usize,
) -> Result<Vec<(BlockDescriptor, Vec<u8>)>, CatalogError> {
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();

    for desc in blocks {
        let catalog = catalog.clone();
        let permits = permits.clone();
        let (sid, token) = (sid.to_string(), token.to_string());
        set.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| CatalogError::Unavailable("fetch pool closed".to_string()))?;
            let payload = catalog.fetch_block(&sid, &token, &desc).await?;
            Ok::<_, CatalogError>((desc, payload))
        });
    }

    let mut fetched = Vec::with_capacity(set.len());
    while let Some(res) = set.join_next().await {
        match res {
            Ok(Ok(block)) => fetched.push(block),
            Ok(Err(e)) => return Err(e),
            Err(e) => return Err(CatalogError::TaskError(e.to_string())),
        }
    }
    Ok(fetched)
}
