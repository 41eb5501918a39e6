//! Queries answered straight from the remote, bypassing the cache.
//!
//! Only the sensor token is read locally. Every call lists the catalog,
//! fetches the blocks it needs and decodes them in memory.

use std::{cmp::Reverse, sync::Arc};

use futures_util::future::try_join_all;
use tracing::debug;

use super::{SeriesQuery, decode_window, error::QueryError, frame::Frame, select_blocks};
use crate::{
    block::{BlockDescriptor, BlockId, DataPoint, codec},
    catalog::{self, Catalog},
    store::BlockStore,
};

pub struct RemoteQuery<C> {
    store: BlockStore,
    catalog: Arc<C>,
    workers: usize,
}

impl<C: Catalog> RemoteQuery<C> {
    pub fn new(store: BlockStore, catalog: Arc<C>, workers: usize) -> Self {
        Self {
            store,
            catalog,
            workers: workers.max(1),
        }
    }

    async fn token(&self, sid: &str) -> Result<String, QueryError> {
        self.store
            .token(sid.to_string())
            .await?
            .ok_or_else(|| QueryError::UnknownSensor(sid.to_string()))
    }

    /// Ordered samples of `sid` within the query window.
    ///
    /// Without a recycle id the newest generation the remote lists is used.
    /// Blocks that fail to decode are logged and skipped.
    pub async fn series(&self, sid: &str, query: &SeriesQuery) -> Result<Vec<DataPoint>, QueryError> {
        let (head, tail) = query.window()?;
        let token = self.token(sid).await?;

        let cursor = BlockId::new(query.rid.unwrap_or(0), 0, 0);
        let mut listed = self.catalog.list_blocks(sid, &token, cursor).await?;
        let Some(rid) = query.rid.or_else(|| listed.iter().map(|d| d.id.rid).max()) else {
            return Ok(Vec::new());
        };

        listed.sort_by_key(|d| (Reverse(d.id.lvl), d.id.bid));
        let num_listed = listed.len();
        let selected = select_blocks(listed, rid, head, tail, |d: &BlockDescriptor| d.id);
        debug!(sid, rid, num_listed, num_selected = selected.len(), "fetching blocks");

        let mut fetched = catalog::fetch_all(&self.catalog, sid, &token, selected, self.workers).await?;
        fetched.sort_by_key(|(d, _)| d.id.bid);
        Ok(decode_window(
            sid,
            fetched.iter().map(|(d, payload)| (d.id, d.ext.as_str(), payload.as_slice())),
            head,
            tail,
        ))
    }

    /// Outer join of several series on timestamp, each on its newest generation.
    pub async fn dataframe(&self, sids: &[String], query: &SeriesQuery) -> Result<Frame, QueryError> {
        let query = SeriesQuery {
            rid: None,
            ..query.clone()
        };
        let series = try_join_all(sids.iter().map(|sid| self.series(sid, &query))).await?;
        Ok(Frame::join(sids.to_vec(), series))
    }

    /// Origin of the earliest block the remote lists.
    pub async fn first_timestamp(&self, sid: &str) -> Result<Option<i64>, QueryError> {
        let token = self.token(sid).await?;
        let listed = self.catalog.list_blocks(sid, &token, BlockId::default()).await?;
        Ok(listed.iter().map(|d| d.id.bid).min())
    }

    /// Tail sample of the latest listed block, read from its header.
    pub async fn last_datapoint(&self, sid: &str) -> Result<Option<DataPoint>, QueryError> {
        let token = self.token(sid).await?;
        let listed = self.catalog.list_blocks(sid, &token, BlockId::default()).await?;
        let Some(last) = listed.into_iter().max_by_key(|d| d.id.bid) else {
            return Ok(None);
        };

        let payload = self.catalog.fetch_block(sid, &token, &last).await?;
        let header = codec::decode_header(&last.ext, &payload)?;
        Ok(Some(header.tail.into()))
    }

    pub async fn last_timestamp(&self, sid: &str) -> Result<Option<i64>, QueryError> {
        Ok(self.last_datapoint(sid).await?.map(|p| p.timestamp))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        block::{codec::GZIP_EXT, error::CodecError},
        catalog::{error::CatalogError, memory::MemoryCatalog},
    };

    async fn setup() -> (BlockStore, Arc<MemoryCatalog>, RemoteQuery<MemoryCatalog>) {
        let store = BlockStore::open_in_memory().await.unwrap();
        store.add_sensor("S1".into(), "T".into()).await.unwrap();
        let catalog = Arc::new(MemoryCatalog::new().with_token("S1", "T"));
        let remote = RemoteQuery::new(store.clone(), catalog.clone(), 4);
        (store, catalog, remote)
    }

    fn publish(catalog: &MemoryCatalog, id: BlockId, points: &[(i64, f64)]) {
        let points: Vec<DataPoint> = points.iter().copied().map(DataPoint::from).collect();
        catalog.publish("S1", id, GZIP_EXT, codec::encode(&points).unwrap());
    }

    fn pairs(points: &[DataPoint]) -> Vec<(i64, f64)> {
        points.iter().map(|p| (p.timestamp, p.value)).collect()
    }

    #[tokio::test]
    async fn test_series_fetches_only_overlapping_blocks() {
        let (store, catalog, remote) = setup().await;
        publish(&catalog, BlockId::new(0, 8, 768), &[(800, 1.0), (1000, 2.0)]);
        // already inside the level 8 block
        publish(&catalog, BlockId::new(0, 0, 1000), &[(1000, 2.0)]);
        publish(&catalog, BlockId::new(0, 4, 1024), &[(1024, 3.0)]);
        publish(&catalog, BlockId::new(0, 0, 1040), &[(1040, 4.0)]);
        publish(&catalog, BlockId::new(0, 0, 5000), &[(5000, 5.0)]);

        let query = SeriesQuery::new().head(900).tail(1100);
        let points = remote.series("S1", &query).await.unwrap();

        assert_eq!(pairs(&points), vec![(1000, 2.0), (1024, 3.0), (1040, 4.0)]);
        assert_eq!(catalog.fetch_calls(), 3);
        assert!(store.all_ordered("S1".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_series_picks_newest_generation() {
        let (_store, catalog, remote) = setup().await;
        publish(&catalog, BlockId::new(0, 0, 1000), &[(1000, 1.0)]);
        publish(&catalog, BlockId::new(1, 0, 2000), &[(2000, 2.0)]);

        let current = remote.series("S1", &SeriesQuery::new()).await.unwrap();
        assert_eq!(pairs(&current), vec![(2000, 2.0)]);

        let old = remote.series("S1", &SeriesQuery::new().rid(0)).await.unwrap();
        assert_eq!(pairs(&old), vec![(1000, 1.0)]);
    }

    #[tokio::test]
    async fn test_corrupt_block_is_skipped() {
        let (_store, catalog, remote) = setup().await;
        catalog.publish("S1", BlockId::new(0, 0, 1000), GZIP_EXT, b"garbage".to_vec());
        publish(&catalog, BlockId::new(0, 0, 1001), &[(1001, 2.0)]);

        let points = remote.series("S1", &SeriesQuery::new()).await.unwrap();
        assert_eq!(pairs(&points), vec![(1001, 2.0)]);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let (_store, catalog, remote) = setup().await;
        publish(&catalog, BlockId::new(0, 0, 1000), &[(1000, 1.0)]);
        catalog.set_failing(Some("connection reset"));

        assert!(matches!(
            remote.series("S1", &SeriesQuery::new()).await,
            Err(QueryError::TransportError(CatalogError::Unavailable(_)))
        ));
        assert!(matches!(
            remote.last_datapoint("S1").await,
            Err(QueryError::TransportError(CatalogError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_unknown_sensor() {
        let (_store, _catalog, remote) = setup().await;
        assert!(matches!(
            remote.series("S9", &SeriesQuery::new()).await,
            Err(QueryError::UnknownSensor(sid)) if sid == "S9"
        ));
    }

    #[tokio::test]
    async fn test_first_and_last() {
        let (_store, catalog, remote) = setup().await;
        assert_eq!(remote.first_timestamp("S1").await.unwrap(), None);
        assert_eq!(remote.last_datapoint("S1").await.unwrap(), None);

        publish(&catalog, BlockId::new(0, 4, 1024), &[(1024, 3.0), (1030, 3.5)]);
        publish(&catalog, BlockId::new(0, 0, 1040), &[(1040, 4.0), (1041, 4.5)]);

        assert_eq!(remote.first_timestamp("S1").await.unwrap(), Some(1024));
        assert_eq!(
            remote.last_datapoint("S1").await.unwrap(),
            Some(DataPoint::new(1041, 4.5))
        );
        assert_eq!(remote.last_timestamp("S1").await.unwrap(), Some(1041));
        // only the latest block is fetched for its header
        assert_eq!(catalog.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_last_datapoint_propagates_corruption() {
        let (_store, catalog, remote) = setup().await;
        catalog.publish("S1", BlockId::new(0, 0, 1000), GZIP_EXT, b"nope".to_vec());

        assert!(matches!(
            remote.last_datapoint("S1").await,
            Err(QueryError::CodecError(CodecError::CorruptPayload(_)))
        ));
    }

    #[tokio::test]
    async fn test_dataframe_outer_join() {
        let (store, catalog, remote) = setup().await;
        store.add_sensor("S2".into(), "T2".into()).await.unwrap();
        publish(&catalog, BlockId::new(0, 0, 1000), &[(1000, 1.0), (1001, 2.0)]);
        let raw = codec::encode(&[DataPoint::new(1001, 20.0)]).unwrap();
        catalog.publish("S2", BlockId::new(0, 0, 1000), GZIP_EXT, raw);

        let sids = vec!["S1".to_string(), "S2".to_string()];
        let frame = remote.dataframe(&sids, &SeriesQuery::new()).await.unwrap();
        let rows: Vec<(i64, Vec<Option<f64>>)> = frame
            .rows
            .into_iter()
            .map(|r| (r.timestamp, r.values))
            .collect();
        assert_eq!(
            rows,
            vec![(1000, vec![Some(1.0), None]), (1001, vec![Some(2.0), Some(20.0)])]
        );
    }
}
