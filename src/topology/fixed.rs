//! A fixed in-memory topology for adapters and tests.

use parking_lot::RwLock;
use std::collections::HashSet;

use crate::ring::{Token, TokenRange};
use crate::topology::{ClusterTopology, NodeAddr};

/// A cluster topology backed by a fixed segment map.
///
/// Segments are declared by their end token; the segment from the last
/// declared token to the ring edge wraps around to the first segment's
/// replicas, matching how a token ring assigns the wrap range. Node
/// liveness can be toggled at runtime to exercise failure paths.
pub struct FixedTopology {
    local: NodeAddr,
    replication_factor: usize,
    /// (segment end token, preference-ordered replicas), sorted by token.
    segments: Vec<(Token, Vec<NodeAddr>)>,
    down: RwLock<HashSet<NodeAddr>>,
}

impl FixedTopology {
    /// Create a topology with no segments.
    pub fn new(local: NodeAddr, replication_factor: usize) -> Self {
        FixedTopology {
            local,
            replication_factor,
            segments: Vec::new(),
            down: RwLock::new(HashSet::new()),
        }
    }

    /// Declare the segment ending at `end` with the given replicas.
    pub fn with_segment(mut self, end: Token, replicas: Vec<NodeAddr>) -> Self {
        self.segments.push((end, replicas));
        self.segments.sort_by_key(|(token, _)| *token);
        self
    }

    /// Mark a node down (or back up).
    pub fn set_down(&self, node: &NodeAddr, down: bool) {
        let mut set = self.down.write();
        if down {
            set.insert(node.clone());
        } else {
            set.remove(node);
        }
    }
}

impl ClusterTopology for FixedTopology {
    fn local_node(&self) -> NodeAddr {
        self.local.clone()
    }

    fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    fn ring_boundaries(&self) -> Vec<Token> {
        self.segments.iter().map(|(token, _)| *token).collect()
    }

    fn replicas(&self, range: &TokenRange) -> Vec<NodeAddr> {
        if self.segments.is_empty() {
            return Vec::new();
        }

        // The wrap segment past the last boundary belongs with the first
        // declared segment.
        if range.right.is_min() {
            return self.segments[0].1.clone();
        }
        self.segments
            .iter()
            .find(|(end, _)| *end >= range.right)
            .map(|(_, replicas)| replicas.clone())
            .unwrap_or_else(|| self.segments[0].1.clone())
    }

    fn is_alive(&self, node: &NodeAddr) -> bool {
        !self.down.read().contains(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes() -> Vec<NodeAddr> {
        (1..=3)
            .map(|i| NodeAddr::new(format!("n{i}")))
            .collect()
    }

    fn topology() -> FixedTopology {
        let n = nodes();
        FixedTopology::new(n[0].clone(), 3)
            .with_segment(Token::new(0), vec![n[0].clone(), n[1].clone(), n[2].clone()])
            .with_segment(Token::new(100), vec![n[1].clone(), n[2].clone(), n[0].clone()])
    }

    #[test]
    fn test_replicas_by_segment() {
        let topo = topology();
        let n = nodes();

        let low = TokenRange::new(Token::new(-10), Token::new(0));
        assert_eq!(topo.replicas(&low)[0], n[0]);

        let mid = TokenRange::new(Token::new(0), Token::new(50));
        assert_eq!(topo.replicas(&mid)[0], n[1]);
    }

    #[test]
    fn test_wrap_segment_uses_first_replicas() {
        let topo = topology();
        let n = nodes();
        let wrap = TokenRange::new(Token::new(100), Token::MIN);
        assert_eq!(topo.replicas(&wrap)[0], n[0]);
    }

    #[test]
    fn test_liveness_toggle() {
        let topo = topology();
        let n = nodes();
        assert!(topo.is_alive(&n[1]));
        topo.set_down(&n[1], true);
        assert!(!topo.is_alive(&n[1]));
        topo.set_down(&n[1], false);
        assert!(topo.is_alive(&n[1]));
    }
}
