// THEORY:
// The `TimeSeries` is the historical narrative of one site: every analysed
// scene, reduced to its `SceneRecord` and laid out in acquisition order. It is
// the temporal counterpart of the region layer. Regions group cells in space,
// the series groups scenes in time.
//
// Scenes may finish in any order when processed in parallel, so `aggregate`
// sorts by timestamp instead of trusting arrival order. Two records with the
// same timestamp are a data error and reject the whole series; silently keeping
// either one would hide a duplicated or mislabelled acquisition.

use crate::core_modules::scene_summarizer::SceneRecord;
use crate::error::{NhiError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scene records in strictly ascending timestamp order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimeSeries {
    records: Vec<SceneRecord>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> Option<&SceneRecord> {
        self.records.first()
    }

    pub fn last(&self) -> Option<&SceneRecord> {
        self.records.last()
    }

    pub fn records(&self) -> &[SceneRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SceneRecord> {
        self.records.iter()
    }

    /// The record acquired at exactly `timestamp`.
    pub fn at(&self, timestamp: DateTime<Utc>) -> Option<&SceneRecord> {
        self.records
            .binary_search_by_key(&timestamp, |r| r.timestamp)
            .ok()
            .map(|i| &self.records[i])
    }

    /// Scenes with at least one HOT or EXTREME cell.
    pub fn flagged(&self) -> impl Iterator<Item = &SceneRecord> {
        self.records.iter().filter(|r| r.is_flagged())
    }

    /// Scenes with at least one valid cell.
    pub fn observed(&self) -> impl Iterator<Item = &SceneRecord> {
        self.records.iter().filter(|r| r.is_observed())
    }
}

impl<'a> IntoIterator for &'a TimeSeries {
    type Item = &'a SceneRecord;
    type IntoIter = std::slice::Iter<'a, SceneRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl IntoIterator for TimeSeries {
    type Item = SceneRecord;
    type IntoIter = std::vec::IntoIter<SceneRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Orders `records` by timestamp. Fails on the first shared timestamp.
pub fn aggregate(mut records: Vec<SceneRecord>) -> Result<TimeSeries> {
    records.sort_by_key(|r| r.timestamp);

    if let Some(i) = records
        .windows(2)
        .position(|pair| pair[0].timestamp == pair[1].timestamp)
    {
        let second = records.swap_remove(i + 1);
        let first = records.swap_remove(i);
        return Err(NhiError::DuplicateTimestamp {
            first: Box::new(first),
            second: Box::new(second),
        });
    }

    log::debug!("aggregated {} scene records", records.len());
    Ok(TimeSeries { records })
}
