use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::StagingRecord;

/// A validated row together with the timestamp of the raw batch it came from
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRow {
    pub batch: String,
    pub record: StagingRecord,
}

pub struct DataMerger;

impl Default for DataMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl DataMerger {
    pub fn new() -> Self {
        Self
    }

    /// Keep one row per capital_key: the latest observation, and on equal
    /// observation times the row from the later batch.
    ///
    /// Returns the surviving rows sorted by capital_key and the number of
    /// rows discarded as duplicates.
    pub fn merge(&self, rows: Vec<BatchRow>) -> (Vec<StagingRecord>, usize) {
        let mut latest: BTreeMap<String, BatchRow> = BTreeMap::new();
        let mut duplicates = 0;

        for row in rows {
            match latest.entry(row.record.capital_key.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(row);
                }
                Entry::Occupied(mut slot) => {
                    duplicates += 1;
                    if Self::supersedes(&row, slot.get()) {
                        debug!(
                            "{}: batch {} supersedes batch {}",
                            row.record.capital_key,
                            row.batch,
                            slot.get().batch
                        );
                        slot.insert(row);
                    }
                }
            }
        }

        let records = latest.into_values().map(|row| row.record).collect();
        (records, duplicates)
    }

    fn supersedes(candidate: &BatchRow, current: &BatchRow) -> bool {
        candidate
            .record
            .observed_at
            .cmp(&current.record.observed_at)
            .then_with(|| candidate.batch.cmp(&current.batch))
            .is_gt()
    }
}
