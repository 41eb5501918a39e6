use std::{
    collections::BTreeMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use super::{Catalog, error::CatalogError};
use crate::block::{BlockDescriptor, BlockId};

/// In-process catalog. Holds blocks per sensor and accepts any token
/// unless one was pinned with [`MemoryCatalog::with_token`].
///
/// Listing answers like the remote does: blocks of later generations, and
/// blocks of the cursor's generation whose coverage reaches past the
/// cursor's origin.
#[derive(Default)]
pub struct MemoryCatalog {
    blocks: Mutex<BTreeMap<String, BTreeMap<BlockId, (String, Vec<u8>)>>>,
    tokens: Mutex<BTreeMap<String, String>>,
    failing: Mutex<Option<String>>,
    cursors: Mutex<Vec<BlockId>>,
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, sid: &str, token: &str) -> Self {
        self.lock_tokens().insert(sid.to_string(), token.to_string());
        self
    }

    /// Publishes a block. Replaces an existing block at the same id.
    pub fn publish(&self, sid: &str, id: BlockId, ext: &str, payload: Vec<u8>) {
        self.lock_blocks()
            .entry(sid.to_string())
            .or_default()
            .insert(id, (ext.to_string(), payload));
    }

    /// Withdraws a block, as the remote does once it has been aggregated.
    pub fn withdraw(&self, sid: &str, id: BlockId) {
        if let Some(blocks) = self.lock_blocks().get_mut(sid) {
            blocks.remove(&id);
        }
    }

    /// Makes every following call fail with `reason`, or succeed again with `None`.
    pub fn set_failing(&self, reason: Option<&str>) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = reason.map(str::to_string);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Cursors received by `list_blocks`, oldest call first.
    pub fn cursors(&self) -> Vec<BlockId> {
        self.cursors.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Most fetches ever running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn lock_blocks(
        &self,
    ) -> std::sync::MutexGuard<'_, BTreeMap<String, BTreeMap<BlockId, (String, Vec<u8>)>>> {
        self.blocks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_tokens(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, sid: &str, token: &str) -> Result<(), CatalogError> {
        if let Some(reason) = self.failing.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            return Err(CatalogError::Unavailable(reason));
        }
        match self.lock_tokens().get(sid) {
            Some(expected) if expected != token => Err(CatalogError::BadStatus {
                url: format!("memory://sensor/{sid}"),
                status: 403,
            }),
            _ => Ok(()),
        }
    }
}

impl Catalog for MemoryCatalog {
    async fn list_blocks(
        &self,
        sid: &str,
        token: &str,
        cursor: BlockId,
    ) -> Result<Vec<BlockDescriptor>, CatalogError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.cursors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(cursor);
        self.check(sid, token)?;

        let mut list: Vec<BlockDescriptor> = self
            .lock_blocks()
            .get(sid)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|(id, _)| {
                        id.rid > cursor.rid
                            || (id.rid == cursor.rid && id.coverage_end() > cursor.bid)
                    })
                    .map(|(id, (ext, _))| BlockDescriptor {
                        id: *id,
                        ext: ext.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        list.sort_by_key(|b| b.id.bid);
        Ok(list)
    }

    async fn fetch_block(
        &self,
        sid: &str,
        token: &str,
        block: &BlockDescriptor,
    ) -> Result<Vec<u8>, CatalogError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.check(sid, token)?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        // let the other fetch tasks run while this one is in flight
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        let res = self
            .lock_blocks()
            .get(sid)
            .and_then(|blocks| blocks.get(&block.id))
            .map(|(_, payload)| payload.clone())
            .ok_or_else(|| CatalogError::UnknownBlock {
                sid: sid.to_string(),
                rid: block.id.rid,
                lvl: block.id.lvl,
                bid: block.id.bid,
            });
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        res
    }
}
