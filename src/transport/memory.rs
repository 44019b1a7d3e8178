//! In-memory transport backed by per-node row stores.
//!
//! Each node holds its own copy of table data, so tests can stage
//! replica divergence, down nodes, and slow links without a network.

use ahash::AHashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{Result, XystonError};
use crate::ring::RowKey;
use crate::scan::row::rows_digest;
use crate::scan::{FilterExpression, RangeScanRequest, Row};
use crate::topology::NodeAddr;
use crate::transport::{DataReply, DigestReply, Transport};

#[derive(Default)]
struct NodeState {
    /// (keyspace, table) to rows in key order.
    tables: AHashMap<(String, String), BTreeMap<RowKey, Row>>,
    down: bool,
    delay: Option<Duration>,
    repairs_received: usize,
}

/// An in-process cluster of replica row stores.
#[derive(Default)]
pub struct MemoryTransport {
    nodes: RwLock<AHashMap<NodeAddr, NodeState>>,
}

impl MemoryTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        MemoryTransport::default()
    }

    /// Insert or replace a row on one node.
    pub fn insert_row(&self, node: &NodeAddr, keyspace: &str, table: &str, row: Row) {
        let mut nodes = self.nodes.write();
        let state = nodes.entry(node.clone()).or_default();
        state
            .tables
            .entry((keyspace.to_string(), table.to_string()))
            .or_default()
            .insert(row.key.clone(), row);
    }

    /// Mark a node unreachable (or reachable again).
    pub fn set_down(&self, node: &NodeAddr, down: bool) {
        self.nodes.write().entry(node.clone()).or_default().down = down;
    }

    /// Add a fixed delay to every read served by a node.
    pub fn set_delay(&self, node: &NodeAddr, delay: Duration) {
        self.nodes.write().entry(node.clone()).or_default().delay = Some(delay);
    }

    /// How many repair writes a node has received.
    pub fn repairs_received(&self, node: &NodeAddr) -> usize {
        self.nodes
            .read()
            .get(node)
            .map(|state| state.repairs_received)
            .unwrap_or(0)
    }

    /// All rows a node holds for a table, in key order.
    pub fn rows_at(&self, node: &NodeAddr, keyspace: &str, table: &str) -> Vec<Row> {
        self.nodes
            .read()
            .get(node)
            .and_then(|state| state.tables.get(&(keyspace.to_string(), table.to_string())))
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Execute a scan against one node's store.
    fn execute(&self, node: &NodeAddr, request: &RangeScanRequest) -> Result<Vec<Row>> {
        let delay = {
            let nodes = self.nodes.read();
            let state = nodes
                .get(node)
                .ok_or_else(|| XystonError::transport(format!("unknown node {node}")))?;
            if state.down {
                return Err(XystonError::transport(format!("node {node} unreachable")));
            }
            state.delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let nodes = self.nodes.read();
        let state = nodes
            .get(node)
            .ok_or_else(|| XystonError::transport(format!("unknown node {node}")))?;
        let table = state
            .tables
            .get(&(request.keyspace.clone(), request.table.clone()));
        let Some(table) = table else {
            return Ok(Vec::new());
        };

        let resume = request.filters.iter().find_map(|filter| match filter {
            FilterExpression::AfterKey { key } => Some(key.clone()),
            _ => None,
        });

        let as_of = request.timestamp.timestamp_micros();
        let matching = table.values().filter(|row| {
            request.range.contains(row.token)
                && row.write_time <= as_of
                && request
                    .filters
                    .iter()
                    .filter(|filter| !filter.is_resume())
                    .all(|filter| filter.matches(row))
        });

        if let Some(sort) = &request.sort {
            // Order in the query's sort order, then resume positionally
            // within it, the way the index engine serves ranked pages.
            let mut ordered: Vec<Row> = matching
                .cloned()
                .map(|mut row| {
                    if request.scored() {
                        row.score = Some(score_row(&row, &request.filters));
                    }
                    row
                })
                .collect();
            ordered.sort_by(|a, b| sort.compare(a, b));

            let skip = match resume {
                Some(marker) => ordered
                    .iter()
                    .position(|row| row.key == marker)
                    .map(|index| index + 1)
                    .unwrap_or(0),
                None => 0,
            };
            Ok(ordered.into_iter().skip(skip).take(request.limit).collect())
        } else {
            // Key order; the resume marker is a strict lower bound.
            Ok(matching
                .filter(|row| match &resume {
                    Some(marker) => row.key > *marker,
                    None => true,
                })
                .take(request.limit)
                .cloned()
                .collect())
        }
    }
}

/// Term-frequency score over the request's match filters.
fn score_row(row: &Row, filters: &[FilterExpression]) -> f32 {
    let mut score = 0.0f32;
    for filter in filters {
        if let FilterExpression::Match { field, text } = filter {
            let Some(cell) = row.fields.get(field).and_then(|value| value.as_text()) else {
                continue;
            };
            let cell = cell.to_lowercase();
            for term in text.to_lowercase().split_whitespace() {
                score += cell.matches(term).count() as f32;
            }
        }
    }
    score
}

impl Transport for MemoryTransport {
    fn read_rows(&self, node: &NodeAddr, request: &RangeScanRequest) -> Result<DataReply> {
        Ok(DataReply {
            rows: self.execute(node, request)?,
        })
    }

    fn read_digest(&self, node: &NodeAddr, request: &RangeScanRequest) -> Result<DigestReply> {
        Ok(DigestReply {
            digest: rows_digest(&self.execute(node, request)?),
        })
    }

    fn repair_rows(
        &self,
        node: &NodeAddr,
        keyspace: &str,
        table: &str,
        rows: &[Row],
    ) -> Result<()> {
        let mut nodes = self.nodes.write();
        let state = nodes
            .get_mut(node)
            .ok_or_else(|| XystonError::transport(format!("unknown node {node}")))?;
        if state.down {
            return Err(XystonError::transport(format!("node {node} unreachable")));
        }

        state.repairs_received += 1;
        let table = state
            .tables
            .entry((keyspace.to_string(), table.to_string()))
            .or_default();
        for row in rows {
            // Newest write wins; replaying a repair is a no-op.
            let stale = table
                .get(&row.key)
                .is_none_or(|existing| existing.write_time < row.write_time);
            if stale {
                table.insert(row.key.clone(), row.clone());
            }
        }
        Ok(())
    }
}
