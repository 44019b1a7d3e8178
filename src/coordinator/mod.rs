//! The top-level scan coordinator and its wave loop.
//!
//! One [`Coordinator`] value is constructed per logical query with its
//! dependencies injected; there is no process-global session state. A
//! query runs as a sequence of waves: plan once, dispatch a batch of
//! range reads, block until they all resolve, reconcile into the
//! accumulator, then either finish or dispatch the next wave with a
//! recomputed concurrency.

pub mod config;
pub mod metrics;

pub use self::config::CoordinatorConfig;
pub use self::metrics::{ScanMetrics, ScanMetricsCollector};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cursor::{self, ContinuationToken};
use crate::dispatch::{RepairHandle, ScanDispatcher, ScanHandle, WaveRangeResult};
use crate::error::{Result, XystonError};
use crate::estimator::{IndexStats, YieldEstimator, concurrency_for};
use crate::planner::{self, PlannedRange};
use crate::reconcile::Accumulator;
use crate::ring::RowKey;
use crate::scan::{RangeScanRequest, Row, SearchScan, requires_full_scan};
use crate::topology::{ClusterTopology, OwnershipSnapshot};
use crate::transport::Transport;

/// The final result of one scan page.
#[derive(Debug)]
pub struct ScanOutcome {
    /// Deduplicated rows, globally ordered when the query asked for it.
    pub rows: Vec<Row>,
    /// Opaque continuation token, present while any range still has
    /// rows to yield.
    pub continuation: Option<Vec<u8>>,
    /// Metrics observed while executing the scan.
    pub metrics: ScanMetrics,
}

/// Lets a caller abort a running scan from another thread.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request cancellation. The scan aborts at its next wave boundary
    /// and outstanding range reads are cancelled.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Per-range scan progress tracked across waves.
struct RangeState {
    planned: PlannedRange,
    marker: Option<RowKey>,
    exhausted: bool,
}

impl RangeState {
    fn fresh(planned: PlannedRange) -> Self {
        RangeState {
            planned,
            marker: None,
            exhausted: false,
        }
    }
}

/// Executes scatter-gather range scans against a replicated row store.
pub struct Coordinator {
    topology: Arc<dyn ClusterTopology>,
    transport: Arc<dyn Transport>,
    stats: Arc<dyn IndexStats>,
    config: CoordinatorConfig,
    metrics: Arc<ScanMetricsCollector>,
    cancel: Arc<AtomicBool>,
}

impl Coordinator {
    /// Create a coordinator with default configuration.
    pub fn new(
        topology: Arc<dyn ClusterTopology>,
        transport: Arc<dyn Transport>,
        stats: Arc<dyn IndexStats>,
    ) -> Self {
        Coordinator {
            topology,
            transport,
            stats,
            config: CoordinatorConfig::default(),
            metrics: Arc::new(ScanMetricsCollector::new()),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// A handle that can abort this coordinator's scan.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    /// Execute a scan to completion and return one page of results.
    pub fn execute(&self, scan: SearchScan) -> Result<ScanOutcome> {
        let query_id = Uuid::new_v4();
        if scan.limit == 0 {
            return Err(XystonError::invalid_operation("scan limit must be positive"));
        }

        // PLANNING: ownership and liveness are snapshotted once; a
        // topology change lands in the next page, not this one.
        let snapshot = OwnershipSnapshot::capture(&*self.topology);
        let block_for = scan.consistency.block_for(snapshot.replication_factor());
        let mut states = self.plan_states(&scan, &snapshot)?;
        if states.is_empty() {
            return Ok(self.outcome(Vec::new(), None));
        }

        let full_scan = requires_full_scan(scan.sort.as_ref());
        let mut concurrency = if full_scan {
            // A ranked top-K is only correct if every range reports in.
            states.len()
        } else {
            let estimator = YieldEstimator::new(&*self.stats, self.config.concurrency_margin);
            let yield_estimate = estimator.rows_per_range(
                &scan.keyspace,
                &scan.table,
                &scan.filters,
                states.len(),
            );
            concurrency_for(scan.limit, yield_estimate, states.len())
        };

        let dispatcher = ScanDispatcher::new(
            Arc::clone(&self.transport),
            snapshot.local_node().clone(),
            self.config.read_timeout,
        );
        let mut accumulator = Accumulator::new(scan.sort.clone(), scan.limit);
        let mut repair_handles: Vec<RepairHandle> = Vec::new();
        let mut ranges_scanned = 0usize;

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Err(XystonError::cancelled("scan aborted by caller"));
            }

            // DISPATCHING
            let remaining = scan.limit - accumulator.len();
            let targets: Vec<usize> = states
                .iter()
                .enumerate()
                .filter(|(_, state)| !state.exhausted)
                .map(|(index, _)| index)
                .take(concurrency)
                .collect();
            if targets.is_empty() {
                break;
            }

            let per_range_limit = if full_scan {
                remaining
            } else {
                remaining.div_ceil(targets.len()).max(1)
            };
            debug!(
                %query_id,
                wave_concurrency = targets.len(),
                per_range_limit,
                remaining,
                "dispatching wave"
            );

            let handles: Vec<(usize, ScanHandle)> = targets
                .iter()
                .map(|&index| {
                    let state = &states[index];
                    let mut request =
                        RangeScanRequest::for_range(&scan, state.planned.range, per_range_limit);
                    if let Some(marker) = &state.marker {
                        request = request.with_resume_after(marker.clone());
                    }
                    (
                        index,
                        dispatcher.dispatch(request, &state.planned.replicas, block_for),
                    )
                })
                .collect();

            // AWAITING: all handles must resolve; the first failure
            // aborts the wave and cancels everything still in flight.
            let wave = self.await_wave(handles)?;

            // RECONCILING
            ranges_scanned += wave.len();
            let mut fold_input: Vec<(usize, Vec<Row>)> = Vec::with_capacity(wave.len());
            let mut replica_done: Vec<(bool, Option<RowKey>)> = Vec::with_capacity(wave.len());
            let mut rows_merged = 0u64;
            for (index, result) in wave {
                rows_merged += result.rows.len() as u64;
                self.metrics.record_repairs(result.repairs.len() as u64);
                repair_handles.extend(result.repairs);
                replica_done.push((result.exhausted, result.rows.last().map(|row| row.key.clone())));
                fold_input.push((index, result.rows));
            }
            self.metrics.record_wave(fold_input.len() as u64, rows_merged);

            let markers = accumulator.fold_wave(&fold_input);
            for ((index, marker), (drained, last_returned)) in
                markers.into_iter().zip(replica_done)
            {
                // Truncation may clip the tail of a batch; a replica
                // that reports itself drained still has to be resumed in
                // that case or the clipped rows would never be re-read.
                let clipped = match (&marker, &last_returned) {
                    (Some(marker), Some(last)) => marker != last,
                    (None, Some(_)) => true,
                    (_, None) => false,
                };
                if drained && !clipped {
                    states[index].exhausted = true;
                    states[index].marker = None;
                } else if marker.is_some() {
                    states[index].marker = marker;
                }
            }

            // Termination check.
            if accumulator.len() >= scan.limit {
                break;
            }
            let open_ranges = states.iter().filter(|state| !state.exhausted).count();
            if open_ranges == 0 {
                break;
            }

            concurrency = if full_scan {
                open_ranges
            } else if accumulator.is_empty() {
                // Nothing observed yet; scan everything that is left.
                open_ranges
            } else {
                let observed_rate = accumulator.len() as f64 / ranges_scanned as f64;
                concurrency_for(scan.limit - accumulator.len(), observed_rate, open_ranges)
            };
        }

        // DONE
        let continuation = build_continuation(&states)?;
        let rows = accumulator.into_rows();
        self.metrics.record_returned(rows.len() as u64);
        debug!(
            %query_id,
            rows = rows.len(),
            resumable = continuation.is_some(),
            "scan complete"
        );

        self.report_repairs(repair_handles);
        Ok(self.outcome(rows, continuation))
    }

    /// Plan fresh ranges or resume them from a continuation token.
    fn plan_states(
        &self,
        scan: &SearchScan,
        snapshot: &OwnershipSnapshot,
    ) -> Result<Vec<RangeState>> {
        match &scan.resume_token {
            None => Ok(planner::plan(&scan.range, snapshot, scan.consistency)?
                .into_iter()
                .map(RangeState::fresh)
                .collect()),
            Some(bytes) => {
                let token = ContinuationToken::decode(bytes)?;
                Ok(cursor::resume_plan(&token, snapshot, scan.consistency)?
                    .into_iter()
                    .map(|(planned, marker)| RangeState {
                        planned,
                        marker,
                        exhausted: false,
                    })
                    .collect())
            }
        }
    }

    /// Join every handle of a wave; any failure cancels the rest and
    /// aborts the query with no partial result.
    fn await_wave(
        &self,
        handles: Vec<(usize, ScanHandle)>,
    ) -> Result<Vec<(usize, WaveRangeResult)>> {
        let mut wave = Vec::with_capacity(handles.len());
        let mut failure: Option<XystonError> = None;

        for (index, handle) in handles {
            if failure.is_some() || self.cancel.load(Ordering::SeqCst) {
                // Outstanding repairs of a dead wave are discarded, not
                // applied.
                handle.cancel();
                continue;
            }
            match handle.join() {
                Ok(result) => wave.push((index, result)),
                Err(error) => {
                    warn!(%error, "wave aborted");
                    failure = Some(error);
                }
            }
        }

        match failure {
            Some(error) => Err(error),
            None if self.cancel.load(Ordering::SeqCst) => {
                Err(XystonError::cancelled("scan aborted by caller"))
            }
            None => Ok(wave),
        }
    }

    /// Await repair completions off the caller's thread and report
    /// failures; a lost repair never fails the read that scheduled it.
    fn report_repairs(&self, handles: Vec<RepairHandle>) {
        if handles.is_empty() {
            return;
        }
        let timeout = self.config.repair_timeout;
        let metrics = Arc::clone(&self.metrics);
        thread::spawn(move || {
            for handle in handles {
                let node = handle.node().clone();
                if let Err(error) = handle.join(timeout) {
                    metrics.record_repair_failure();
                    warn!(%node, %error, "read repair did not complete");
                }
            }
        });
    }

    fn outcome(&self, rows: Vec<Row>, continuation: Option<Vec<u8>>) -> ScanOutcome {
        ScanOutcome {
            rows,
            continuation,
            metrics: self.metrics.snapshot(),
        }
    }
}

/// Encode the resume state for every range that can still yield rows.
fn build_continuation(states: &[RangeState]) -> Result<Option<Vec<u8>>> {
    let entries: Vec<_> = states
        .iter()
        .filter(|state| !state.exhausted)
        .map(|state| (state.planned.range, state.marker.clone()))
        .collect();
    if entries.is_empty() {
        return Ok(None);
    }
    Some(ContinuationToken::new(entries).encode()).transpose()
}
