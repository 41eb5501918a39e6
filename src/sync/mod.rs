//! Incremental sync of remote blocks into the local cache.
//!
//! Per sensor: resume from the most recent cached block, ask the catalog for
//! everything at or beyond it, fetch payloads concurrently, then persist and
//! run retention cleanup one block at a time. Inserts and deletes are
//! idempotent, so an interrupted sync can simply be retried.

use std::sync::Arc;

use serde::Serialize;
use tracing::{Instrument, Level, debug, error, info, span};

use crate::{
    block::{Block, BlockId, codec},
    catalog::{self, Catalog},
    store::BlockStore,
    tier,
};
use error::SyncError;

pub mod error;

/// Current time in epoch seconds.
pub type Clock = fn() -> i64;

pub fn system_clock() -> i64 {
    jiff::Timestamp::now().as_second()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// newest cached block is too recent for the remote to have anything newer
    Throttled { cursor: BlockId, cleaned: usize },
    Synced {
        listed: usize,
        inserted: usize,
        cleaned: usize,
    },
}

/// Result of syncing several sensors. One failure does not stop the others.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub results: Vec<(String, Result<SyncOutcome, SyncError>)>,
}

impl SyncReport {
    pub fn is_ok(&self) -> bool {
        self.results.iter().all(|(_, res)| res.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &SyncError)> {
        self.results
            .iter()
            .filter_map(|(sid, res)| res.as_ref().err().map(|e| (sid.as_str(), e)))
    }
}

pub struct SyncEngine<C> {
    store: BlockStore,
    catalog: Arc<C>,
    workers: usize,
    poll_guard: i64,
    clock: Clock,
}

impl<C: Catalog> SyncEngine<C> {
    pub fn new(store: BlockStore, catalog: Arc<C>, workers: usize, poll_guard: i64) -> Self {
        Self {
            store,
            catalog,
            workers: workers.max(1),
            poll_guard,
            clock: system_clock,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn catalog(&self) -> &Arc<C> {
        &self.catalog
    }

    /// Syncs `sids`, or every registered sensor when empty.
    pub async fn sync(&self, sids: &[String]) -> Result<SyncReport, SyncError> {
        let sids = match sids.is_empty() {
            true => self.store.sensors().await?,
            false => sids.to_vec(),
        };

        let mut report = SyncReport::default();
        for sid in sids {
            let span = span!(Level::INFO, "sync", sid = %sid);
            let res = self.sync_sensor(&sid).instrument(span).await;
            if let Err(e) = &res {
                error!(sid = %sid, "sync failed: {e}");
            }
            report.results.push((sid, res));
        }
        Ok(report)
    }

    pub async fn sync_sensor(&self, sid: &str) -> Result<SyncOutcome, SyncError> {
        let mut cleaned = 0;

        let cursor = match self.store.last_by_recency(sid.to_string()).await? {
            Some(last) => {
                let id = last.id;
                // a previous sync may have stopped between insert and cleanup
                cleaned += self.clean(sid, id).await?;

                if (self.clock)() < id.coverage_end().saturating_add(self.poll_guard) {
                    debug!(rid = id.rid, lvl = id.lvl, bid = id.bid, "newest block too recent, not polling");
                    return Ok(SyncOutcome::Throttled { cursor: id, cleaned });
                }
                id
            }
            None => BlockId::default(),
        };

        let token = self
            .store
            .token(sid.to_string())
            .await?
            .ok_or_else(|| SyncError::UnknownSensor(sid.to_string()))?;

        let mut listed = self.catalog.list_blocks(sid, &token, cursor).await?;
        listed.sort_by_key(|b| b.id.bid);
        let num_listed = listed.len();
        debug!(num_listed, "catalog listed blocks");

        let mut fetched = catalog::fetch_all(&self.catalog, sid, &token, listed, self.workers).await?;

        for (desc, payload) in &fetched {
            codec::decode(&desc.ext, payload).map_err(|source| SyncError::BlockRejected {
                id: desc.id,
                source,
            })?;
        }

        // finer blocks land before the coarser blocks that supersede them
        fetched.sort_by_key(|(desc, _)| (desc.id.coverage_end(), desc.id.lvl));

        let mut inserted = 0;
        for (desc, payload) in fetched {
            let size = payload.len();
            let id = desc.id;
            if self.store.insert(Block::new(sid, id, &desc.ext, payload)).await? {
                inserted += 1;
                info!(rid = id.rid, lvl = id.lvl, bid = id.bid, size, "[w] block written");
            }
            cleaned += self.clean(sid, id).await?;
        }

        Ok(SyncOutcome::Synced {
            listed: num_listed,
            inserted,
            cleaned,
        })
    }

    /// Retention cleanup rooted at `id`: deletes the finer blocks of the
    /// same generation that `id` supersedes, cascading down every tier.
    pub async fn clean(&self, sid: &str, id: BlockId) -> Result<usize, SyncError> {
        let mut deleted = 0;
        for step in tier::clean_plan(id.lvl, id.bid) {
            deleted += self
                .store
                .delete_superseded(sid.to_string(), id.rid, step.lvl, step.ceiling)
                .await?;
        }
        if deleted > 0 {
            debug!(rid = id.rid, lvl = id.lvl, bid = id.bid, deleted, "superseded blocks removed");
        }
        Ok(deleted)
    }
}
