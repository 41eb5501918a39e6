//! One handle over the cache, a catalog and the engines working on them.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::{
    block::{BlockInfo, DataPoint},
    catalog::{Catalog, error::CatalogError, http::HttpCatalog},
    config::TmpoConfig,
    query::{QueryEngine, SeriesQuery, error::QueryError, frame::Frame, remote::RemoteQuery},
    store::{BlockStore, error::StoreError},
    sync::{SyncEngine, SyncReport, error::SyncError},
};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("store error `{0}`")]
    StoreError(#[from] StoreError),
    #[error("catalog error `{0}`")]
    CatalogError(#[from] CatalogError),
    #[error("sync error `{0}`")]
    SyncError(#[from] SyncError),
    #[error("query error `{0}`")]
    QueryError(#[from] QueryError),
}

pub struct Session<C> {
    store: BlockStore,
    sync: SyncEngine<C>,
    query: QueryEngine,
    remote: RemoteQuery<C>,
}

impl Session<HttpCatalog> {
    /// Opens the configured cache and talks to the configured remote.
    pub async fn open(cfg: &TmpoConfig) -> Result<Self, SessionError> {
        let store = BlockStore::open(&cfg.db).await?;
        let catalog = HttpCatalog::new(cfg).await?;
        info!(db = %cfg.db.display(), host = %cfg.host, "session opened");
        Ok(Self::new(store, catalog, cfg.workers, cfg.poll_guard))
    }
}

impl<C: Catalog> Session<C> {
    pub fn new(store: BlockStore, catalog: C, workers: usize, poll_guard: i64) -> Self {
        let catalog = Arc::new(catalog);
        Self {
            sync: SyncEngine::new(store.clone(), catalog.clone(), workers, poll_guard),
            query: QueryEngine::new(store.clone()),
            remote: RemoteQuery::new(store.clone(), catalog, workers),
            store,
        }
    }

    pub fn with_sync(mut self, f: impl FnOnce(SyncEngine<C>) -> SyncEngine<C>) -> Self {
        self.sync = f(self.sync);
        self
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<C> {
        self.sync.catalog()
    }

    /// Queries that go to the remote instead of the cache.
    pub fn remote(&self) -> &RemoteQuery<C> {
        &self.remote
    }

    /// Returns false when `sid` was already registered. The token is kept as is then.
    pub async fn register(&self, sid: &str, token: &str) -> Result<bool, SessionError> {
        Ok(self.store.add_sensor(sid.to_string(), token.to_string()).await?)
    }

    /// Drops the registration and every cached block of `sid`.
    pub async fn deregister(&self, sid: &str) -> Result<bool, SessionError> {
        let (removed, blocks) = self.store.remove_sensor(sid.to_string()).await?;
        if removed {
            info!(sid, blocks, "sensor removed");
        }
        Ok(removed)
    }

    /// Drops cached blocks but keeps the registration.
    pub async fn reset(&self, sid: &str) -> Result<usize, SessionError> {
        Ok(self.store.delete_all(sid.to_string()).await?)
    }

    pub async fn sensors(&self) -> Result<Vec<String>, SessionError> {
        Ok(self.store.sensors().await?)
    }

    pub async fn sync(&self, sids: &[String]) -> Result<SyncReport, SessionError> {
        Ok(self.sync.sync(sids).await?)
    }

    /// Cached blocks of `sids` (every registered sensor when empty), in read order.
    pub async fn list(&self, sids: &[String]) -> Result<Vec<BlockInfo>, SessionError> {
        let sids = match sids.is_empty() {
            true => self.store.sensors().await?,
            false => sids.to_vec(),
        };

        let mut infos = Vec::new();
        for sid in sids {
            let blocks = self.store.all_ordered(sid).await?;
            infos.extend(blocks.iter().map(BlockInfo::from));
        }
        Ok(infos)
    }

    pub async fn series(&self, sid: &str, query: &SeriesQuery) -> Result<Vec<DataPoint>, SessionError> {
        Ok(self.query.series(sid, query).await?)
    }

    pub async fn dataframe(&self, sids: &[String], query: &SeriesQuery) -> Result<Frame, SessionError> {
        Ok(self.query.dataframe(sids, query).await?)
    }

    pub async fn first_timestamp(&self, sid: &str) -> Result<Option<i64>, SessionError> {
        Ok(self.query.first_timestamp(sid).await?)
    }

    pub async fn last_timestamp(&self, sid: &str) -> Result<Option<i64>, SessionError> {
        Ok(self.query.last_timestamp(sid).await?)
    }

    pub async fn last_datapoint(&self, sid: &str) -> Result<Option<DataPoint>, SessionError> {
        Ok(self.query.last_datapoint(sid).await?)
    }
}
