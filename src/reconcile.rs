//! Cross-range merging: deduplication, global ordering, and resume
//! marker computation.

use std::collections::{BTreeMap, BTreeSet};

use crate::ring::RowKey;
use crate::scan::{Row, SortSpec};

/// The running, deduplicated, ordered result set for one logical query.
///
/// Owned exclusively by the coordinator; one accumulator lives exactly
/// as long as the query it serves.
pub struct Accumulator {
    rows: BTreeMap<RowKey, Row>,
    sort: Option<SortSpec>,
    limit: usize,
}

impl Accumulator {
    /// Create an accumulator for a query with the given ordering and
    /// row limit.
    pub fn new(sort: Option<SortSpec>, limit: usize) -> Self {
        Accumulator {
            rows: BTreeMap::new(),
            sort,
            limit,
        }
    }

    /// Rows currently held after deduplication and truncation.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the accumulator holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fold one wave of per-range results into the accumulator.
    ///
    /// Rows are deduplicated by key, keeping the newest write. When the
    /// query orders globally, the whole accumulator is re-sorted rather
    /// than merged incrementally, then truncated to the limit.
    ///
    /// Returns, for each dispatched range in `wave` order, the last row
    /// of that range's original return order that survived truncation.
    /// `None` means nothing of that range's batch survived and any
    /// previous marker still stands.
    pub fn fold_wave(&mut self, wave: &[(usize, Vec<Row>)]) -> Vec<(usize, Option<RowKey>)> {
        for (_, rows) in wave {
            for row in rows {
                let newer = self
                    .rows
                    .get(&row.key)
                    .is_none_or(|existing| existing.write_time < row.write_time);
                if newer {
                    self.rows.insert(row.key.clone(), row.clone());
                }
            }
        }

        self.truncate();

        let surviving: BTreeSet<&RowKey> = self.rows.keys().collect();
        wave.iter()
            .map(|(index, rows)| {
                let marker = rows
                    .iter()
                    .rev()
                    .find(|row| surviving.contains(&row.key))
                    .map(|row| row.key.clone());
                (*index, marker)
            })
            .collect()
    }

    /// Drop everything ranked past the limit.
    fn truncate(&mut self) {
        if self.rows.len() <= self.limit {
            return;
        }
        let victims: Vec<RowKey> = self
            .ordered()
            .into_iter()
            .skip(self.limit)
            .map(|row| row.key.clone())
            .collect();
        for key in victims {
            self.rows.remove(&key);
        }
    }

    /// The accumulator contents in final output order.
    fn ordered(&self) -> Vec<&Row> {
        let mut rows: Vec<&Row> = self.rows.values().collect();
        if let Some(sort) = &self.sort {
            rows.sort_by(|a, b| sort.compare(a, b));
        }
        rows
    }

    /// Consume the accumulator into the final ordered row set.
    pub fn into_rows(self) -> Vec<Row> {
        let mut rows: Vec<Row> = match &self.sort {
            Some(sort) => {
                let mut rows: Vec<Row> = self.rows.into_values().collect();
                rows.sort_by(|a, b| sort.compare(a, b));
                rows
            }
            // Key order falls out of the dedup tree.
            None => self.rows.into_values().collect(),
        };
        rows.truncate(self.limit);
        rows
    }
}
