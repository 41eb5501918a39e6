use serde::{Deserialize, Serialize};

use crate::tier;

pub mod codec;
pub mod error;

/// Position of a block within one sensor's history.
///
/// Also used as the sync cursor sent to the remote catalog.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BlockId {
    /// recycle id (retention generation)
    pub rid: i64,
    /// tier level, higher is coarser
    pub lvl: i32,
    /// tier-aligned time origin
    pub bid: i64,
}

impl BlockId {
    pub fn new(rid: i64, lvl: i32, bid: i64) -> Self {
        Self { rid, lvl, bid }
    }

    pub fn coverage_end(&self) -> i64 {
        tier::coverage_end(self.lvl, self.bid)
    }

    pub fn overlaps(&self, head: i64, tail: i64) -> bool {
        tier::overlaps(self.lvl, self.bid, head, tail)
    }

    /// True if `other` lies entirely inside this block's coverage.
    pub fn covers(&self, other: &BlockId) -> bool {
        self.rid == other.rid
            && self.lvl > other.lvl
            && self.bid <= other.bid
            && other.coverage_end() <= self.coverage_end()
    }
}

/// Primary key of a cached block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub sid: String,
    pub id: BlockId,
}

/// A block as advertised by the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    #[serde(flatten)]
    pub id: BlockId,
    pub ext: String,
}

/// A cached block. Immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub key: BlockKey,
    pub ext: String,
    /// insertion time, fractional epoch seconds
    pub created: f64,
    pub payload: Vec<u8>,
}

impl Block {
    /// New block stamped with the current wall-clock time.
    pub fn new(sid: &str, id: BlockId, ext: &str, payload: Vec<u8>) -> Self {
        Self {
            key: BlockKey {
                sid: sid.to_string(),
                id,
            },
            ext: ext.to_string(),
            created: jiff::Timestamp::now().as_microsecond() as f64 / 1e6,
            payload,
        }
    }

    pub fn id(&self) -> BlockId {
        self.key.id
    }
}

/// Block metadata without the payload, for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockInfo {
    pub sid: String,
    pub rid: i64,
    pub lvl: i32,
    pub bid: i64,
    pub ext: String,
    pub created: f64,
    pub size: usize,
}

impl From<&Block> for BlockInfo {
    fn from(block: &Block) -> Self {
        Self {
            sid: block.key.sid.clone(),
            rid: block.key.id.rid,
            lvl: block.key.id.lvl,
            bid: block.key.id.bid,
            ext: block.ext.clone(),
            created: block.created,
            size: block.payload.len(),
        }
    }
}

/// One decoded sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// epoch seconds
    pub timestamp: i64,
    pub value: f64,
}

impl DataPoint {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

impl From<(i64, f64)> for DataPoint {
    fn from((timestamp, value): (i64, f64)) -> Self {
        Self { timestamp, value }
    }
}
