//! The RPC seam between the coordinator and replica nodes.
//!
//! The coordinator depends only on the [`Transport`] trait; an adapter
//! outside this crate binds it to the host's messaging layer. The
//! in-memory [`MemoryTransport`] backend serves adapters and tests.

pub mod memory;

pub use self::memory::MemoryTransport;

use crate::error::Result;
use crate::scan::{RangeScanRequest, Row};
use crate::topology::NodeAddr;

/// A full-row reply from a replica.
#[derive(Debug, Clone)]
pub struct DataReply {
    /// Matching rows in the replica's scan order.
    pub rows: Vec<Row>,
}

/// A hash-only reply used to detect replica divergence cheaply.
#[derive(Debug, Clone, Copy)]
pub struct DigestReply {
    /// crc32 over the canonical encoding of the rows the replica would
    /// have returned.
    pub digest: u32,
}

/// Blocking replica I/O for range scans and read repair.
///
/// Implementations must be safe to call concurrently from the dispatch
/// worker threads.
pub trait Transport: Send + Sync {
    /// Execute a range scan on a replica and return full rows.
    fn read_rows(&self, node: &NodeAddr, request: &RangeScanRequest) -> Result<DataReply>;

    /// Execute a range scan on a replica and return only a digest.
    fn read_digest(&self, node: &NodeAddr, request: &RangeScanRequest) -> Result<DigestReply>;

    /// Write reconciled rows back to a stale replica.
    ///
    /// Must be idempotent: repairs may be retried or partially applied
    /// and converge either way.
    fn repair_rows(
        &self,
        node: &NodeAddr,
        keyspace: &str,
        table: &str,
        rows: &[Row],
    ) -> Result<()>;
}
