//! Per-range request dispatch, quorum resolution, and read repair.
//!
//! One dispatch fans a range scan out to the range's replica set on
//! dedicated threads: the first replica is asked for full rows, the rest
//! for digests. The returned [`ScanHandle`] blocks until enough replies
//! arrive, detects replica divergence from digest mismatches, and
//! schedules repair writes that never block the read itself.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{Result, XystonError};
use crate::ring::RowKey;
use crate::scan::row::rows_digest;
use crate::scan::{RangeScanRequest, Row};
use crate::topology::NodeAddr;
use crate::transport::Transport;

/// Rows and repair obligations produced by one range in one wave.
#[derive(Debug)]
pub struct WaveRangeResult {
    /// Rows in the replica's return order.
    pub rows: Vec<Row>,
    /// Outstanding repair writes scheduled for stale replicas.
    pub repairs: Vec<RepairHandle>,
    /// Whether the range returned fewer rows than requested and has
    /// nothing further to yield.
    pub exhausted: bool,
}

/// Completion handle for one asynchronous repair write.
#[derive(Debug)]
pub struct RepairHandle {
    node: NodeAddr,
    receiver: Receiver<Result<()>>,
}

impl RepairHandle {
    /// The replica the repair targets.
    pub fn node(&self) -> &NodeAddr {
        &self.node
    }

    /// Wait for the repair write to finish.
    ///
    /// Failure is reported to the caller but must not fail the read that
    /// scheduled the repair.
    pub fn join(self, timeout: Duration) -> Result<()> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(_) => Err(XystonError::RepairTimeout { node: self.node }),
        }
    }
}

enum ReplyKind {
    Data(Vec<Row>),
    Digest(u32),
}

struct ReplicaReply {
    node: NodeAddr,
    result: Result<ReplyKind>,
}

/// Dispatches range scans to replica sets and resolves them per
/// consistency level.
pub struct ScanDispatcher {
    transport: Arc<dyn Transport>,
    local: NodeAddr,
    read_timeout: Duration,
}

impl ScanDispatcher {
    /// Create a dispatcher over a transport.
    pub fn new(transport: Arc<dyn Transport>, local: NodeAddr, read_timeout: Duration) -> Self {
        ScanDispatcher {
            transport,
            local,
            read_timeout,
        }
    }

    /// Send one range scan to its replica set.
    ///
    /// Returns immediately; the request is resolved when the handle is
    /// joined. `block_for` is the reply count the consistency level
    /// requires.
    pub fn dispatch(
        &self,
        request: RangeScanRequest,
        replicas: &[NodeAddr],
        block_for: usize,
    ) -> ScanHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = bounded(replicas.len().max(1));
        let deadline = Instant::now() + self.read_timeout;

        // A purely local replica set runs in-process without the digest
        // protocol.
        let local_only = replicas.len() == 1 && replicas[0] == self.local;
        let block_for = if local_only { 1 } else { block_for };

        for (position, node) in replicas.iter().enumerate() {
            let want_data = position == 0;
            self.spawn_worker(node.clone(), request.clone(), want_data, &sender, &cancel);
        }

        ScanHandle {
            request,
            block_for,
            deadline,
            receiver,
            cancel,
            transport: Arc::clone(&self.transport),
        }
    }

    fn spawn_worker(
        &self,
        node: NodeAddr,
        request: RangeScanRequest,
        want_data: bool,
        sender: &Sender<ReplicaReply>,
        cancel: &Arc<AtomicBool>,
    ) {
        let transport = Arc::clone(&self.transport);
        let sender = sender.clone();
        let cancel = Arc::clone(cancel);

        thread::spawn(move || {
            if cancel.load(Ordering::SeqCst) {
                return;
            }
            let result = if want_data {
                transport
                    .read_rows(&node, &request)
                    .map(|reply| ReplyKind::Data(reply.rows))
            } else {
                transport
                    .read_digest(&node, &request)
                    .map(|reply| ReplyKind::Digest(reply.digest))
            };
            if !cancel.load(Ordering::SeqCst) {
                let _ = sender.send(ReplicaReply { node, result });
            }
        });
    }
}

/// A blocking, cancellable handle for one dispatched range scan.
pub struct ScanHandle {
    request: RangeScanRequest,
    block_for: usize,
    deadline: Instant,
    receiver: Receiver<ReplicaReply>,
    cancel: Arc<AtomicBool>,
    transport: Arc<dyn Transport>,
}

impl ScanHandle {
    /// The request this handle resolves.
    pub fn request(&self) -> &RangeScanRequest {
        &self.request
    }

    /// Cancel the outstanding request. Worker threads stop reporting and
    /// no repair is scheduled.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Block until the consistency level is satisfied or the read
    /// deadline passes.
    pub fn join(self) -> Result<WaveRangeResult> {
        let mut data: Option<(NodeAddr, Vec<Row>)> = None;
        let mut digests: Vec<(NodeAddr, u32)> = Vec::new();
        let mut received = 0usize;

        loop {
            if received >= self.block_for {
                if let Some((data_node, rows)) = data.take() {
                    return self.resolve(rows, data_node, digests);
                }
            }
            match self.receiver.recv_deadline(self.deadline) {
                Ok(reply) => match reply.result {
                    Ok(ReplyKind::Data(rows)) => {
                        received += 1;
                        data = Some((reply.node, rows));
                    }
                    Ok(ReplyKind::Digest(digest)) => {
                        received += 1;
                        digests.push((reply.node, digest));
                    }
                    Err(error) => {
                        warn!(node = %reply.node, %error, "replica read failed");
                    }
                },
                Err(_) => {
                    // Deadline passed, or every worker finished without
                    // reaching the threshold.
                    self.cancel();
                    return Err(XystonError::ReadTimeout {
                        block_for: self.block_for,
                        received,
                    });
                }
            }
        }
    }

    /// Compare digests, reconcile divergent replicas, and schedule
    /// repair writes.
    fn resolve(
        &self,
        rows: Vec<Row>,
        data_node: NodeAddr,
        digests: Vec<(NodeAddr, u32)>,
    ) -> Result<WaveRangeResult> {
        let expected = rows_digest(&rows);
        let mismatched: Vec<NodeAddr> = digests
            .into_iter()
            .filter(|(_, digest)| *digest != expected)
            .map(|(node, _)| node)
            .collect();

        let mut repairs = Vec::new();
        let mut reconciled = rows;

        if !mismatched.is_empty() {
            debug!(
                range = %self.request.range,
                replicas = mismatched.len(),
                "digest mismatch, reconciling full replies"
            );

            let mut merged: BTreeMap<RowKey, Row> = reconciled
                .into_iter()
                .map(|row| (row.key.clone(), row))
                .collect();

            // The full-data round blocks the read; an unresolved reply
            // here is an unresolved digest failure and aborts the scan.
            for node in &mismatched {
                let reply = self.transport.read_rows(node, &self.request)?;
                for row in reply.rows {
                    let newer = merged
                        .get(&row.key)
                        .is_none_or(|existing| existing.write_time < row.write_time);
                    if newer {
                        merged.insert(row.key.clone(), row);
                    }
                }
            }

            reconciled = order_for_return(merged, &self.request);

            // The data replica may itself be the stale one.
            let mut targets = mismatched;
            if rows_digest(&reconciled) != expected {
                targets.push(data_node);
            }
            for node in targets {
                repairs.push(self.schedule_repair(node, reconciled.clone()));
            }
        }

        let exhausted = reconciled.len() < self.request.limit;
        Ok(WaveRangeResult {
            rows: reconciled,
            repairs,
            exhausted,
        })
    }

    fn schedule_repair(&self, node: NodeAddr, rows: Vec<Row>) -> RepairHandle {
        let (sender, receiver) = bounded(1);
        let transport = Arc::clone(&self.transport);
        let keyspace = self.request.keyspace.clone();
        let table = self.request.table.clone();
        let target = node.clone();
        let cancel = Arc::clone(&self.cancel);

        thread::spawn(move || {
            if cancel.load(Ordering::SeqCst) {
                return;
            }
            let result = transport.repair_rows(&target, &keyspace, &table, &rows);
            let _ = sender.send(result);
        });

        RepairHandle { node, receiver }
    }
}

/// Restore the replica return-order contract after reconciliation: the
/// query's sort order when it has one, key order otherwise, truncated
/// to the request's limit.
fn order_for_return(merged: BTreeMap<RowKey, Row>, request: &RangeScanRequest) -> Vec<Row> {
    let mut rows: Vec<Row> = merged.into_values().collect();
    if let Some(sort) = &request.sort {
        rows.sort_by(|a, b| sort.compare(a, b));
    }
    rows.truncate(request.limit);
    rows
}
