//! Consistency levels for range reads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The minimum replica acknowledgement pattern required before a read is
/// considered successful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    /// One replica must reply.
    One,
    /// Two replicas must reply.
    Two,
    /// Three replicas must reply.
    Three,
    /// A majority of replicas must reply.
    Quorum,
    /// Every replica must reply.
    All,
}

impl ConsistencyLevel {
    /// The number of replica replies to block for, given the keyspace
    /// replication factor.
    pub fn block_for(&self, replication_factor: usize) -> usize {
        match self {
            ConsistencyLevel::One => 1,
            ConsistencyLevel::Two => 2,
            ConsistencyLevel::Three => 3,
            ConsistencyLevel::Quorum => replication_factor / 2 + 1,
            ConsistencyLevel::All => replication_factor,
        }
    }

    /// Whether `alive` live replicas are enough to attempt a read at this
    /// level.
    pub fn is_satisfied_by(&self, alive: usize, replication_factor: usize) -> bool {
        alive >= self.block_for(replication_factor)
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsistencyLevel::One => "ONE",
            ConsistencyLevel::Two => "TWO",
            ConsistencyLevel::Three => "THREE",
            ConsistencyLevel::Quorum => "QUORUM",
            ConsistencyLevel::All => "ALL",
        };
        write!(f, "{name}")
    }
}
