//! Cluster topology abstraction.
//!
//! The coordinator never reaches into host internals: everything it needs
//! to know about the cluster arrives through the [`ClusterTopology`] trait,
//! implemented by an adapter layer outside this crate. Planning works from
//! an [`OwnershipSnapshot`] captured once per planning pass, so a topology
//! change during a multi-wave query is reflected only in the next page.

pub mod consistency;
pub mod fixed;

pub use self::consistency::ConsistencyLevel;
pub use self::fixed::FixedTopology;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, XystonError};
use crate::ring::{Token, TokenRange};

/// Address of a cluster node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeAddr(String);

impl NodeAddr {
    /// Create a node address.
    pub fn new(addr: impl Into<String>) -> Self {
        NodeAddr(addr.into())
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the coordinator needs to know about the cluster.
///
/// Replica lists are preference ordered: adapters should put the closest
/// or least loaded replica first, since the dispatcher asks the first
/// replica for data and the rest for digests.
pub trait ClusterTopology: Send + Sync {
    /// The node this coordinator runs on.
    fn local_node(&self) -> NodeAddr;

    /// The keyspace replication factor.
    fn replication_factor(&self) -> usize;

    /// Sorted ownership boundary tokens for the ring.
    fn ring_boundaries(&self) -> Vec<Token>;

    /// Replicas owning a range that lies within one ownership segment,
    /// in preference order. Liveness is not filtered here.
    fn replicas(&self, range: &TokenRange) -> Vec<NodeAddr>;

    /// Whether a node is currently believed alive.
    fn is_alive(&self, node: &NodeAddr) -> bool;
}

/// A read-only snapshot of ring ownership and replica liveness.
///
/// Captured once at planning time and never refreshed for the lifetime of
/// the query it plans.
#[derive(Debug, Clone)]
pub struct OwnershipSnapshot {
    local: NodeAddr,
    replication_factor: usize,
    segments: Vec<(TokenRange, Vec<NodeAddr>)>,
}

impl OwnershipSnapshot {
    /// Capture the current ownership map and replica liveness.
    pub fn capture(topology: &dyn ClusterTopology) -> Self {
        let mut boundaries = topology.ring_boundaries();
        boundaries.sort();
        boundaries.dedup();

        let segments = TokenRange::full_ring()
            .split_at(&boundaries)
            .into_iter()
            .map(|segment| {
                let live = topology
                    .replicas(&segment)
                    .into_iter()
                    .filter(|node| topology.is_alive(node))
                    .collect();
                (segment, live)
            })
            .collect();

        OwnershipSnapshot {
            local: topology.local_node(),
            replication_factor: topology.replication_factor(),
            segments,
        }
    }

    /// The local node at capture time.
    pub fn local_node(&self) -> &NodeAddr {
        &self.local
    }

    /// The replication factor at capture time.
    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    /// Ownership boundary tokens, sorted.
    pub fn boundaries(&self) -> Vec<Token> {
        self.segments
            .iter()
            .map(|(segment, _)| segment.right)
            .filter(|token| !token.is_min())
            .collect()
    }

    /// Live replicas, in preference order, for a range lying within a
    /// single ownership segment.
    pub fn live_replicas(&self, range: &TokenRange) -> Result<Vec<NodeAddr>> {
        self.segments
            .iter()
            .find(|(segment, _)| segment.encloses(range))
            .map(|(_, live)| live.clone())
            .ok_or_else(|| {
                XystonError::plan(format!("range {range} spans ownership segments"))
            })
    }
}
