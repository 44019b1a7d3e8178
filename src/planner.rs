//! Range planning: splitting a requested range at ownership boundaries
//! and merging adjacent sub-ranges that share enough live replicas.

use crate::error::{Result, XystonError};
use crate::ring::TokenRange;
use crate::topology::{ConsistencyLevel, NodeAddr, OwnershipSnapshot};

/// Cost the heuristic assigns to issuing one extra range request.
const REQUEST_OVERHEAD_COST: f64 = 1.0;

/// Cost per replica the merged range loses from the wider of the two
/// replica sets. Fewer replicas means fewer fallback choices for the
/// data read.
const REPLICA_LOSS_COST: f64 = 0.5;

/// One planned sub-range with its live, consistency-filtered replica set.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRange {
    /// The sub-range to scan.
    pub range: TokenRange,
    /// Live replicas in preference order. Always satisfies the
    /// consistency level the plan was made for.
    pub replicas: Vec<NodeAddr>,
}

/// Produce the ordered, disjoint sub-range list for a requested range.
///
/// The output covers exactly the requested range. Each sub-range carries
/// a replica set that satisfies `consistency`; if any sub-range cannot,
/// planning fails before anything is dispatched.
pub fn plan(
    requested: &TokenRange,
    snapshot: &OwnershipSnapshot,
    consistency: ConsistencyLevel,
) -> Result<Vec<PlannedRange>> {
    let block_for = consistency.block_for(snapshot.replication_factor());
    if block_for == 0 {
        return Err(XystonError::plan("consistency level blocks for zero replicas"));
    }

    let boundaries = snapshot.boundaries();
    let mut planned = Vec::new();

    for piece in requested.unwrap() {
        for range in piece.split_at(&boundaries) {
            let replicas = snapshot.live_replicas(&range)?;
            if replicas.len() < block_for {
                return Err(XystonError::InsufficientReplicas {
                    required: block_for,
                    alive: replicas.len(),
                });
            }
            planned.push(PlannedRange { range, replicas });
        }
    }

    Ok(merge_adjacent(planned, block_for))
}

/// Greedy left-to-right merge of adjacent sub-ranges.
///
/// A merge is taken when the left range does not end at the ring edge,
/// the intersection of the two live replica sets still satisfies the
/// consistency level, and the cost heuristic favors one request over
/// two. Ties favor merging.
fn merge_adjacent(planned: Vec<PlannedRange>, block_for: usize) -> Vec<PlannedRange> {
    let mut merged: Vec<PlannedRange> = Vec::with_capacity(planned.len());

    for next in planned {
        let Some(current) = merged.last_mut() else {
            merged.push(next);
            continue;
        };

        if current.range.right.is_min() || current.range.right != next.range.left {
            merged.push(next);
            continue;
        }

        let common = intersect(&current.replicas, &next.replicas);
        if common.len() < block_for {
            merged.push(next);
            continue;
        }

        let lost = current
            .replicas
            .len()
            .max(next.replicas.len())
            .saturating_sub(common.len());
        if REQUEST_OVERHEAD_COST >= lost as f64 * REPLICA_LOSS_COST {
            current.range.right = next.range.right;
            current.replicas = common;
        } else {
            merged.push(next);
        }
    }

    merged
}

/// Intersection of two replica lists, preserving the order of the first.
fn intersect(left: &[NodeAddr], right: &[NodeAddr]) -> Vec<NodeAddr> {
    left.iter()
        .filter(|node| right.contains(node))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::Token;
    use crate::topology::{ClusterTopology, FixedTopology};

    fn node(i: usize) -> NodeAddr {
        NodeAddr::new(format!("n{i}"))
    }

    /// Four segments over five nodes, replication factor three.
    fn topology() -> FixedTopology {
        FixedTopology::new(node(1), 3)
            .with_segment(Token::new(-100), vec![node(1), node(2), node(3)])
            .with_segment(Token::new(0), vec![node(2), node(3), node(4)])
            .with_segment(Token::new(100), vec![node(3), node(4), node(5)])
    }

    fn snapshot(topo: &FixedTopology) -> OwnershipSnapshot {
        OwnershipSnapshot::capture(topo)
    }

    #[test]
    fn test_plan_covers_requested_range() {
        let topo = topology();
        let requested = TokenRange::full_ring();
        let planned = plan(&requested, &snapshot(&topo), ConsistencyLevel::One).unwrap();

        // Output ranges are ordered, adjacent, and end at the ring edge.
        assert!(!planned.is_empty());
        assert!(planned[0].range.left.is_min());
        assert!(planned.last().unwrap().range.right.is_min());
        for pair in planned.windows(2) {
            assert_eq!(pair[0].range.right, pair[1].range.left);
        }
    }

    #[test]
    fn test_single_owner_range_is_not_split() {
        let topo = topology();
        let requested = TokenRange::new(Token::new(10), Token::new(50));
        let planned = plan(&requested, &snapshot(&topo), ConsistencyLevel::Quorum).unwrap();
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].range, requested);
    }

    #[test]
    fn test_adjacent_ranges_merge_when_replicas_overlap() {
        let topo = topology();
        // Spans the -100 and 0 segments; their replica sets share
        // {n2, n3}, enough for quorum of rf 3.
        let requested = TokenRange::new(Token::new(-150), Token::new(-10));
        let planned = plan(&requested, &snapshot(&topo), ConsistencyLevel::Quorum).unwrap();

        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].range, requested);
        assert_eq!(planned[0].replicas, vec![node(2), node(3)]);
    }

    #[test]
    fn test_merge_declined_below_quorum() {
        let topo = topology();
        topo.set_down(&node(2), true);
        // With n2 down the shared replicas drop to {n3}: below quorum,
        // so the two sub-ranges stay separate.
        let requested = TokenRange::new(Token::new(-150), Token::new(-10));
        let planned = plan(&requested, &snapshot(&topo), ConsistencyLevel::Quorum).unwrap();

        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].range.right, Token::new(-100));
    }

    #[test]
    fn test_no_merge_across_ring_edge() {
        let topo = topology();
        // A wrapping range whose pieces touch only at the ring edge.
        let requested = TokenRange::new(Token::new(150), Token::new(-150));
        let planned = plan(&requested, &snapshot(&topo), ConsistencyLevel::One).unwrap();

        assert!(planned.len() >= 2);
        assert!(planned.iter().any(|p| p.range.right.is_min()));
        // Nothing merged across the edge: some range still starts there.
        assert!(planned.iter().any(|p| p.range.left.is_min()));
    }

    #[test]
    fn test_insufficient_replicas_fails_planning() {
        let topo = topology();
        topo.set_down(&node(1), true);
        topo.set_down(&node(2), true);
        let requested = TokenRange::new(Token::new(-150), Token::new(-110));

        let result = plan(&requested, &snapshot(&topo), ConsistencyLevel::Quorum);
        match result {
            Err(XystonError::InsufficientReplicas { required, alive }) => {
                assert_eq!(required, 2);
                assert_eq!(alive, 1);
            }
            other => panic!("expected InsufficientReplicas, got {other:?}"),
        }
    }

    #[test]
    fn test_replica_order_is_preserved() {
        let topo = topology();
        let requested = TokenRange::new(Token::new(10), Token::new(50));
        let planned = plan(&requested, &snapshot(&topo), ConsistencyLevel::Quorum).unwrap();
        let expected = topo.replicas(&requested);
        assert_eq!(planned[0].replicas, expected);
    }
}
