//! Local block cache backed by SQLite.
//!
//! Two tables, kept compatible with existing caches:
//! `sensor(sid, token)` and `tmpo(sid, rid, lvl, bid, ext, created, data)`.
//! Every operation is a single closure on the connection thread, so writes
//! from concurrent callers are serialized here.

use std::path::Path;

use rusqlite::{OptionalExtension, Row, params};
use tokio_rusqlite::Connection;

use crate::block::{Block, BlockDescriptor, BlockId, BlockKey};
use error::StoreError;

pub mod error;

const SQL_SENSOR_TABLE: &str = "CREATE TABLE IF NOT EXISTS sensor(
    sid TEXT,
    token TEXT,
    PRIMARY KEY(sid))";

const SQL_TMPO_TABLE: &str = "CREATE TABLE IF NOT EXISTS tmpo(
    sid TEXT,
    rid INTEGER,
    lvl INTEGER,
    bid INTEGER,
    ext TEXT,
    created REAL,
    data BLOB,
    PRIMARY KEY(sid, rid, lvl, bid))";

const SQL_SENSOR_INS: &str = "INSERT OR IGNORE INTO sensor (sid, token) VALUES (?1, ?2)";
const SQL_SENSOR_DEL: &str = "DELETE FROM sensor WHERE sid = ?1";
const SQL_SENSOR_ALL: &str = "SELECT sid FROM sensor ORDER BY sid";
const SQL_SENSOR_TOKEN: &str = "SELECT token FROM sensor WHERE sid = ?1";

const SQL_TMPO_INS: &str = "INSERT OR IGNORE INTO tmpo
    (sid, rid, lvl, bid, ext, created, data)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

const SQL_TMPO_DEL: &str = "DELETE FROM tmpo WHERE sid = ?1";

const SQL_TMPO_CLEAN: &str = "DELETE FROM tmpo
    WHERE sid = ?1 AND rid = ?2 AND lvl = ?3 AND bid <= ?4";

const SQL_TMPO_ALL: &str = "SELECT sid, rid, lvl, bid, ext, created, data
    FROM tmpo
    WHERE sid = ?1
    ORDER BY rid ASC, lvl DESC, bid ASC";

// rowid breaks ties between blocks written within the same clock tick
const SQL_TMPO_LAST: &str = "SELECT rid, lvl, bid, ext
    FROM tmpo
    WHERE sid = ?1
    ORDER BY created DESC, lvl DESC, rowid DESC
    LIMIT 1";

const SQL_TMPO_LAST_DATA: &str = "SELECT sid, rid, lvl, bid, ext, created, data
    FROM tmpo
    WHERE sid = ?1
    ORDER BY created DESC, lvl DESC, rowid DESC
    LIMIT 1";

const SQL_TMPO_FIRST: &str = "SELECT rid, lvl, bid
    FROM tmpo
    WHERE sid = ?1
    ORDER BY created ASC, lvl ASC, rowid ASC
    LIMIT 1";

const SQL_TMPO_RID_MAX: &str = "SELECT MAX(rid) FROM tmpo WHERE sid = ?1";

/// Handle to the cache. Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct BlockStore(Connection);

fn block_from_row(row: &Row) -> rusqlite::Result<Block> {
    Ok(Block {
        key: BlockKey {
            sid: row.get(0)?,
            id: BlockId {
                rid: row.get(1)?,
                lvl: row.get(2)?,
                bid: row.get(3)?,
            },
        },
        ext: row.get(4)?,
        created: row.get(5)?,
        payload: row.get(6)?,
    })
}

impl BlockStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        Self::init(Connection::open(path.to_owned()).await?).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().await?).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute(SQL_SENSOR_TABLE, ())?;
            conn.execute(SQL_TMPO_TABLE, ())?;
            Ok(())
        })
        .await?;
        Ok(Self(conn))
    }

    /// registers a sensor, returns false if it already was
    pub async fn add_sensor(&self, sid: String, token: String) -> Result<bool, StoreError> {
        let added = self
            .0
            .call(move |conn| Ok(conn.execute(SQL_SENSOR_INS, params![sid, token])?))
            .await?;
        Ok(added > 0)
    }

    /// Removes a sensor and every block cached for it.
    /// Returns whether the sensor was registered and how many blocks went.
    pub async fn remove_sensor(&self, sid: String) -> Result<(bool, usize), StoreError> {
        Ok(self
            .0
            .call(move |conn| {
                let tx = conn.transaction()?;
                let removed = tx.execute(SQL_SENSOR_DEL, params![sid])?;
                let blocks = tx.execute(SQL_TMPO_DEL, params![sid])?;
                tx.commit()?;
                Ok((removed > 0, blocks))
            })
            .await?)
    }

    pub async fn sensors(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .0
            .call(|conn| {
                let mut stmt = conn.prepare(SQL_SENSOR_ALL)?;
                let sids = stmt
                    .query_map((), |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(sids)
            })
            .await?)
    }

    pub async fn token(&self, sid: String) -> Result<Option<String>, StoreError> {
        Ok(self
            .0
            .call(move |conn| {
                Ok(conn
                    .query_row(SQL_SENSOR_TOKEN, params![sid], |row| row.get(0))
                    .optional()?)
            })
            .await?)
    }

    /// Inserts a block unless its key is already cached.
    /// Existing blocks are never overwritten. Returns true if written.
    pub async fn insert(&self, block: Block) -> Result<bool, StoreError> {
        let written = self
            .0
            .call(move |conn| {
                let Block {
                    key,
                    ext,
                    created,
                    payload,
                } = block;
                Ok(conn.execute(
                    SQL_TMPO_INS,
                    params![key.sid, key.id.rid, key.id.lvl, key.id.bid, ext, created, payload],
                )?)
            })
            .await?;
        Ok(written > 0)
    }

    /// Key and encoding of the most recently inserted block.
    pub async fn last_by_recency(&self, sid: String) -> Result<Option<BlockDescriptor>, StoreError> {
        Ok(self
            .0
            .call(move |conn| {
                Ok(conn
                    .query_row(SQL_TMPO_LAST, params![sid], |row| {
                        Ok(BlockDescriptor {
                            id: BlockId {
                                rid: row.get(0)?,
                                lvl: row.get(1)?,
                                bid: row.get(2)?,
                            },
                            ext: row.get(3)?,
                        })
                    })
                    .optional()?)
            })
            .await?)
    }

    /// Most recently inserted block, with its payload.
    pub async fn last_block(&self, sid: String) -> Result<Option<Block>, StoreError> {
        Ok(self
            .0
            .call(move |conn| {
                Ok(conn
                    .query_row(SQL_TMPO_LAST_DATA, params![sid], block_from_row)
                    .optional()?)
            })
            .await?)
    }

    /// Earliest inserted block.
    pub async fn first_by_recency(&self, sid: String) -> Result<Option<BlockId>, StoreError> {
        Ok(self
            .0
            .call(move |conn| {
                Ok(conn
                    .query_row(SQL_TMPO_FIRST, params![sid], |row| {
                        Ok(BlockId {
                            rid: row.get(0)?,
                            lvl: row.get(1)?,
                            bid: row.get(2)?,
                        })
                    })
                    .optional()?)
            })
            .await?)
    }

    /// Every cached block of a sensor, coarsest tiers of each generation first.
    pub async fn all_ordered(&self, sid: String) -> Result<Vec<Block>, StoreError> {
        Ok(self
            .0
            .call(move |conn| {
                let mut stmt = conn.prepare(SQL_TMPO_ALL)?;
                let blocks = stmt
                    .query_map(params![sid], block_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(blocks)
            })
            .await?)
    }

    pub async fn max_recycle_id(&self, sid: String) -> Result<Option<i64>, StoreError> {
        Ok(self
            .0
            .call(move |conn| {
                Ok(conn.query_row(SQL_TMPO_RID_MAX, params![sid], |row| {
                    row.get::<_, Option<i64>>(0)
                })?)
            })
            .await?)
    }

    /// Deletes blocks at exactly `(sid, rid, lvl)` with `bid <= ceiling`.
    pub async fn delete_superseded(
        &self,
        sid: String,
        rid: i64,
        lvl: i32,
        ceiling: i64,
    ) -> Result<usize, StoreError> {
        Ok(self
            .0
            .call(move |conn| Ok(conn.execute(SQL_TMPO_CLEAN, params![sid, rid, lvl, ceiling])?))
            .await?)
    }

    /// Deletes every cached block of a sensor, keeps the registration.
    pub async fn delete_all(&self, sid: String) -> Result<usize, StoreError> {
        Ok(self
            .0
            .call(move |conn| Ok(conn.execute(SQL_TMPO_DEL, params![sid])?))
            .await?)
    }
}
