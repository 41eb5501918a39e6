//! Reconstructs series from cached blocks.

use futures_util::future::try_join_all;
use tracing::warn;

use crate::{
    block::{Block, BlockId, DataPoint, codec},
    store::BlockStore,
};
use error::QueryError;
use frame::Frame;
use time::{EPOCHS_MAX, TimeArg};

pub mod error;
pub mod frame;
pub mod remote;
pub mod time;

/// Window and generation of a series query. Everything is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesQuery {
    /// recycle id, defaults to the newest cached generation
    pub rid: Option<i64>,
    /// inclusive start, defaults to 0
    pub head: Option<TimeArg>,
    /// inclusive end, defaults to [`EPOCHS_MAX`]
    pub tail: Option<TimeArg>,
}

impl SeriesQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rid(mut self, rid: i64) -> Self {
        self.rid = Some(rid);
        self
    }

    pub fn head(mut self, head: impl Into<TimeArg>) -> Self {
        self.head = Some(head.into());
        self
    }

    pub fn tail(mut self, tail: impl Into<TimeArg>) -> Self {
        self.tail = Some(tail.into());
        self
    }

    /// `(head, tail)` in epoch seconds.
    pub fn window(&self) -> Result<(i64, i64), QueryError> {
        let head = self.head.as_ref().map(TimeArg::to_epoch).transpose()?;
        let tail = self.tail.as_ref().map(TimeArg::to_epoch).transpose()?;
        Ok((head.unwrap_or(0), tail.unwrap_or(EPOCHS_MAX)))
    }
}

/// Picks the blocks of generation `rid` that intersect `[head, tail]`.
///
/// `blocks` must come coarsest tier first, as the store lists them. A finer
/// block lying entirely inside an already picked coarser one is skipped, so
/// a cache that has not been cleaned yet does not yield samples twice.
/// The result is ordered by origin.
pub fn select_blocks<T>(blocks: Vec<T>, rid: i64, head: i64, tail: i64, id_of: impl Fn(&T) -> BlockId) -> Vec<T> {
    let mut selected: Vec<T> = Vec::new();
    for block in blocks {
        let id = id_of(&block);
        if id.rid != rid || !id.overlaps(head, tail) {
            continue;
        }
        if selected.iter().any(|s| id_of(s).covers(&id)) {
            continue;
        }
        selected.push(block);
    }
    selected.sort_by_key(|b| id_of(b).bid);
    selected
}

/// Decoded samples of `blocks`, in order, cut to `[head, tail]`.
/// Blocks that fail to decode are logged and skipped.
fn decode_window<'a>(
    sid: &str,
    blocks: impl IntoIterator<Item = (BlockId, &'a str, &'a [u8])>,
    head: i64,
    tail: i64,
) -> Vec<DataPoint> {
    let mut points = Vec::new();
    for (id, ext, payload) in blocks {
        match codec::decode(ext, payload) {
            Ok(decoded) => points.extend(
                decoded
                    .points
                    .into_iter()
                    .filter(|p| head <= p.timestamp && p.timestamp <= tail),
            ),
            Err(e) => warn!(sid, rid = id.rid, lvl = id.lvl, bid = id.bid, "skipping block: {e}"),
        }
    }
    points
}

#[derive(Clone)]
pub struct QueryEngine {
    store: BlockStore,
}

impl QueryEngine {
    pub fn new(store: BlockStore) -> Self {
        Self { store }
    }

    /// Ordered samples of `sid` within the query window.
    ///
    /// Blocks that fail to decode are logged and skipped.
    pub async fn series(&self, sid: &str, query: &SeriesQuery) -> Result<Vec<DataPoint>, QueryError> {
        let (head, tail) = query.window()?;

        let rid = match query.rid {
            Some(rid) => rid,
            None => match self.store.max_recycle_id(sid.to_string()).await? {
                Some(rid) => rid,
                None => return Ok(Vec::new()),
            },
        };

        let blocks = self.store.all_ordered(sid.to_string()).await?;
        let selected = select_blocks(blocks, rid, head, tail, Block::id);
        Ok(decode_window(
            sid,
            selected.iter().map(|b| (b.id(), b.ext.as_str(), b.payload.as_slice())),
            head,
            tail,
        ))
    }

    /// Outer join of several series on timestamp. `rid` is ignored, each
    /// sensor uses its newest generation.
    pub async fn dataframe(&self, sids: &[String], query: &SeriesQuery) -> Result<Frame, QueryError> {
        let query = SeriesQuery {
            rid: None,
            ..query.clone()
        };
        let series = try_join_all(sids.iter().map(|sid| self.series(sid, &query))).await?;
        Ok(Frame::join(sids.to_vec(), series))
    }

    /// Tail sample of the most recently written block, read from its header.
    pub async fn last_datapoint(&self, sid: &str) -> Result<Option<DataPoint>, QueryError> {
        let Some(block) = self.store.last_block(sid.to_string()).await? else {
            return Ok(None);
        };
        let header = codec::decode_header(&block.ext, &block.payload)?;
        Ok(Some(header.tail.into()))
    }

    pub async fn last_timestamp(&self, sid: &str) -> Result<Option<i64>, QueryError> {
        Ok(self.last_datapoint(sid).await?.map(|p| p.timestamp))
    }

    /// Origin of the earliest written block.
    pub async fn first_timestamp(&self, sid: &str) -> Result<Option<i64>, QueryError> {
        Ok(self
            .store
            .first_by_recency(sid.to_string())
            .await?
            .map(|id| id.bid))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block::{codec::GZIP_EXT, error::CodecError};

    async fn store_with(blocks: &[(BlockId, &[(i64, f64)])]) -> BlockStore {
        let store = BlockStore::open_in_memory().await.unwrap();
        for (n, (id, points)) in blocks.iter().enumerate() {
            let points: Vec<DataPoint> = points.iter().copied().map(DataPoint::from).collect();
            let mut block = Block::new("S1", *id, GZIP_EXT, codec::encode(&points).unwrap());
            // insertion order decides recency
            block.created = n as f64 + 1.0;
            store.insert(block).await.unwrap();
        }
        store
    }

    fn pairs(points: &[DataPoint]) -> Vec<(i64, f64)> {
        points.iter().map(|p| (p.timestamp, p.value)).collect()
    }

    #[tokio::test]
    async fn test_coverage_filter() {
        let id = BlockId::new(0, 4, 1024);
        let store = store_with(&[(id, &[(1024, 1.0), (1030, 2.0), (1039, 3.0)])]).await;
        let engine = QueryEngine::new(store);

        let inside = SeriesQuery::new().head(1024).tail(1024 + 16 - 1);
        assert_eq!(engine.series("S1", &inside).await.unwrap().len(), 3);

        let before = SeriesQuery::new().tail(1023);
        assert!(engine.series("S1", &before).await.unwrap().is_empty());

        let after = SeriesQuery::new().head(1040);
        assert!(engine.series("S1", &after).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_truncates_to_window() {
        let store = store_with(&[(BlockId::new(0, 4, 1024), &[(1024, 1.0), (1030, 2.0), (1039, 3.0)])]).await;
        let engine = QueryEngine::new(store);

        let points = engine
            .series("S1", &SeriesQuery::new().head(1025).tail(1030))
            .await
            .unwrap();
        assert_eq!(pairs(&points), vec![(1030, 2.0)]);
    }

    #[tokio::test]
    async fn test_concatenates_tiers_in_time_order() {
        let store = store_with(&[
            (BlockId::new(0, 0, 1040), &[(1040, 4.0)]),
            (BlockId::new(0, 8, 768), &[(800, 1.0), (1000, 2.0)]),
            (BlockId::new(0, 4, 1024), &[(1024, 3.0)]),
        ])
        .await;
        let engine = QueryEngine::new(store);

        let points = engine.series("S1", &SeriesQuery::new()).await.unwrap();
        assert_eq!(
            pairs(&points),
            vec![(800, 1.0), (1000, 2.0), (1024, 3.0), (1040, 4.0)]
        );
    }

    #[tokio::test]
    async fn test_stale_generation_is_invisible() {
        let store = store_with(&[
            (BlockId::new(0, 0, 1000), &[(1000, 1.0)]),
            (BlockId::new(1, 0, 2000), &[(2000, 2.0)]),
        ])
        .await;
        let engine = QueryEngine::new(store);

        let current = engine.series("S1", &SeriesQuery::new()).await.unwrap();
        assert_eq!(pairs(&current), vec![(2000, 2.0)]);

        let old = engine.series("S1", &SeriesQuery::new().rid(0)).await.unwrap();
        assert_eq!(pairs(&old), vec![(1000, 1.0)]);
    }

    #[tokio::test]
    async fn test_uncleaned_cache_does_not_duplicate() {
        let store = store_with(&[
            (BlockId::new(0, 0, 1000), &[(1000, 1.0), (1001, 2.0)]),
            (BlockId::new(0, 8, 768), &[(1000, 1.0), (1001, 2.0)]),
        ])
        .await;
        let engine = QueryEngine::new(store);

        let points = engine.series("S1", &SeriesQuery::new()).await.unwrap();
        assert_eq!(pairs(&points), vec![(1000, 1.0), (1001, 2.0)]);
    }

    #[tokio::test]
    async fn test_bad_blocks_are_skipped() {
        let store = store_with(&[(BlockId::new(0, 0, 1001), &[(1001, 2.0)])]).await;
        store
            .insert(Block::new("S1", BlockId::new(0, 0, 1000), GZIP_EXT, b"not gzip".to_vec()))
            .await
            .unwrap();
        let raw = codec::encode(&[DataPoint::new(1002, 3.0)]).unwrap();
        store
            .insert(Block::new("S1", BlockId::new(0, 0, 1002), "lz4", raw))
            .await
            .unwrap();
        let engine = QueryEngine::new(store);

        let points = engine.series("S1", &SeriesQuery::new()).await.unwrap();
        assert_eq!(pairs(&points), vec![(1001, 2.0)]);
    }

    #[tokio::test]
    async fn test_empty_cache() {
        let engine = QueryEngine::new(BlockStore::open_in_memory().await.unwrap());
        assert!(engine.series("S1", &SeriesQuery::new()).await.unwrap().is_empty());
        assert_eq!(engine.last_datapoint("S1").await.unwrap(), None);
        assert_eq!(engine.first_timestamp("S1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unsupported_time_format() {
        let engine = QueryEngine::new(BlockStore::open_in_memory().await.unwrap());
        let civil = jiff::civil::date(2017, 10, 1).at(0, 0, 0, 0);
        assert!(matches!(
            engine.series("S1", &SeriesQuery::new().head(civil)).await,
            Err(QueryError::UnsupportedTimeFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_last_and_first() {
        let store = store_with(&[
            (BlockId::new(0, 4, 1024), &[(1024, 3.0), (1030, 3.5)]),
            (BlockId::new(0, 0, 1040), &[(1040, 4.0), (1041, 4.5)]),
        ])
        .await;
        let engine = QueryEngine::new(store);

        assert_eq!(
            engine.last_datapoint("S1").await.unwrap(),
            Some(DataPoint::new(1041, 4.5))
        );
        assert_eq!(engine.last_timestamp("S1").await.unwrap(), Some(1041));
        assert_eq!(engine.first_timestamp("S1").await.unwrap(), Some(1024));
    }

    #[tokio::test]
    async fn test_last_datapoint_propagates_corruption() {
        let store = BlockStore::open_in_memory().await.unwrap();
        store
            .insert(Block::new("S1", BlockId::new(0, 0, 1000), GZIP_EXT, b"nope".to_vec()))
            .await
            .unwrap();
        let engine = QueryEngine::new(store);

        assert!(matches!(
            engine.last_datapoint("S1").await,
            Err(QueryError::CodecError(CodecError::CorruptPayload(_)))
        ));
    }

    #[tokio::test]
    async fn test_dataframe_outer_join() {
        let store = store_with(&[(BlockId::new(0, 0, 1000), &[(1000, 1.0), (1001, 2.0)])]).await;
        let raw = codec::encode(&[DataPoint::new(1001, 20.0), DataPoint::new(1002, 30.0)]).unwrap();
        store
            .insert(Block::new("S2", BlockId::new(0, 0, 1000), GZIP_EXT, raw))
            .await
            .unwrap();
        let engine = QueryEngine::new(store);

        let sids = vec!["S1".to_string(), "S2".to_string()];
        let frame = engine.dataframe(&sids, &SeriesQuery::new()).await.unwrap();

        assert_eq!(frame.columns, sids);
        let rows: Vec<(i64, Vec<Option<f64>>)> = frame
            .rows
            .into_iter()
            .map(|r| (r.timestamp, r.values))
            .collect();
        assert_eq!(
            rows,
            vec![
                (1000, vec![Some(1.0), None]),
                (1001, vec![Some(2.0), Some(20.0)]),
                (1002, vec![None, Some(30.0)]),
            ]
        );
    }
}
