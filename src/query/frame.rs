use std::collections::BTreeMap;

use serde::Serialize;

use crate::block::DataPoint;

/// Several series aligned on timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<FrameRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameRow {
    pub timestamp: i64,
    /// one entry per column, `None` where that series has no sample
    pub values: Vec<Option<f64>>,
}

impl Frame {
    /// Outer join, rows ascending by timestamp. A repeated timestamp within
    /// one series keeps its last value.
    pub fn join(columns: Vec<String>, series: Vec<Vec<DataPoint>>) -> Self {
        let width = columns.len();
        let mut rows: BTreeMap<i64, Vec<Option<f64>>> = BTreeMap::new();

        for (col, points) in series.into_iter().enumerate() {
            for p in points {
                rows.entry(p.timestamp).or_insert_with(|| vec![None; width])[col] = Some(p.value);
            }
        }

        Self {
            columns,
            rows: rows
                .into_iter()
                .map(|(timestamp, values)| FrameRow { timestamp, values })
                .collect(),
        }
    }
}
