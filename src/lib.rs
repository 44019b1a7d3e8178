//! # Xyston
//!
//! A distributed scatter-gather search coordinator for partitioned,
//! replicated row stores.
//!
//! ## Features
//!
//! - Range planning over a token ring with quorum-aware merging
//! - Adaptive wave concurrency driven by yield estimation
//! - Per-range dispatch with digest resolution and read repair
//! - Cross-range deduplication and global reordering
//! - Resumable pagination via opaque continuation tokens

pub mod coordinator;
pub mod cursor;
pub mod dispatch;
pub mod error;
pub mod estimator;
pub mod planner;
pub mod reconcile;
pub mod ring;
pub mod scan;
pub mod topology;
pub mod transport;
pub mod util;

pub mod prelude {
    //! Convenience re-exports for common usage.

    pub use crate::coordinator::{Coordinator, CoordinatorConfig, ScanOutcome};
    pub use crate::error::{Result, XystonError};
    pub use crate::ring::{RowKey, Token, TokenRange};
    pub use crate::scan::{FieldSort, FieldValue, FilterExpression, Row, SearchScan, SortSpec};
    pub use crate::topology::{ClusterTopology, ConsistencyLevel, NodeAddr};
    pub use crate::transport::Transport;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
