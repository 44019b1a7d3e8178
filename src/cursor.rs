//! Continuation tokens for resuming a scan across pages.
//!
//! A token is an ordered list of (range bounds, encoded row key) pairs:
//! one entry per range that still has rows to yield. Ranges a page never
//! reached are carried without a marker. The token is opaque to callers
//! and round-trips through [`ContinuationToken::encode`].

use serde::{Deserialize, Serialize};

use crate::error::{Result, XystonError};
use crate::planner::{self, PlannedRange};
use crate::ring::{RowKey, TokenRange};
use crate::topology::{ConsistencyLevel, OwnershipSnapshot};

/// The opaque resume state for one logical scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuationToken {
    /// (range bounds, wire-encoded resume key) in range order.
    entries: Vec<(TokenRange, Option<Vec<u8>>)>,
}

impl ContinuationToken {
    /// Build a token from per-range resume markers.
    pub fn new(entries: Vec<(TokenRange, Option<RowKey>)>) -> Self {
        ContinuationToken {
            entries: entries
                .into_iter()
                .map(|(range, marker)| (range, marker.map(|key| key.encode())))
                .collect(),
        }
    }

    /// Whether the token carries no resumable ranges.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode the per-range resume markers.
    pub fn entries(&self) -> Result<Vec<(TokenRange, Option<RowKey>)>> {
        self.entries
            .iter()
            .map(|(range, marker)| {
                let marker = marker
                    .as_deref()
                    .map(RowKey::decode)
                    .transpose()?;
                Ok((*range, marker))
            })
            .collect()
    }

    /// Serialize to the opaque wire form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|error| XystonError::serialization(format!("continuation token: {error}")))
    }

    /// Deserialize from the opaque wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|error| XystonError::serialization(format!("continuation token: {error}")))
    }
}

/// Re-plan a continuation token against a fresh ownership snapshot.
///
/// Replica sets are recomputed from scratch; a range may split further if
/// ownership moved between pages. The range's marker applies to every
/// sub-range it splits into, since the marker only ever narrows a scan.
pub fn resume_plan(
    token: &ContinuationToken,
    snapshot: &OwnershipSnapshot,
    consistency: ConsistencyLevel,
) -> Result<Vec<(PlannedRange, Option<RowKey>)>> {
    let mut resumed = Vec::new();
    for (range, marker) in token.entries()? {
        for planned in planner::plan(&range, snapshot, consistency)? {
            resumed.push((planned, marker.clone()));
        }
    }
    Ok(resumed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::Token;
    use crate::topology::{FixedTopology, NodeAddr};

    fn token_entries() -> Vec<(TokenRange, Option<RowKey>)> {
        vec![
            (
                TokenRange::new(Token::new(0), Token::new(100)),
                Some(RowKey::new(b"p1".to_vec(), b"c1".to_vec())),
            ),
            (TokenRange::new(Token::new(100), Token::MIN), None),
        ]
    }

    #[test]
    fn test_round_trip() {
        let token = ContinuationToken::new(token_entries());
        let bytes = token.encode().unwrap();
        let decoded = ContinuationToken::decode(&bytes).unwrap();
        assert_eq!(decoded, token);
        assert_eq!(decoded.entries().unwrap(), token_entries());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(ContinuationToken::decode(&[0xde, 0xad, 0xbe]).is_err());
    }

    #[test]
    fn test_resume_plan_recomputes_replicas() {
        let nodes: Vec<NodeAddr> = (1..=3).map(|i| NodeAddr::new(format!("n{i}"))).collect();
        let topo = FixedTopology::new(nodes[0].clone(), 3)
            .with_segment(Token::new(0), nodes.clone())
            .with_segment(Token::new(200), nodes.clone());
        let snapshot = OwnershipSnapshot::capture(&topo);

        let token = ContinuationToken::new(token_entries());
        let resumed = resume_plan(&token, &snapshot, ConsistencyLevel::Quorum).unwrap();

        assert_eq!(resumed.len(), 2);
        // The first entry keeps its marker, the unscanned one has none.
        assert!(resumed[0].1.is_some());
        assert!(resumed[1].1.is_none());
        for (planned, _) in &resumed {
            assert!(planned.replicas.len() >= 2);
        }
    }
}
