//! Configuration for the scan coordinator.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`Coordinator`](crate::coordinator::Coordinator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Deadline for resolving one range read at its consistency level.
    pub read_timeout: Duration,

    /// Deadline for one read-repair write. Longer than the read timeout
    /// since repair never blocks returning data.
    pub repair_timeout: Duration,

    /// Fraction reserved as a yield under-estimate so waves scan
    /// slightly wider than predicted.
    pub concurrency_margin: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            repair_timeout: Duration::from_secs(10),
            concurrency_margin: 0.1,
        }
    }
}

impl CoordinatorConfig {
    /// Set the read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the repair timeout.
    pub fn with_repair_timeout(mut self, timeout: Duration) -> Self {
        self.repair_timeout = timeout;
        self
    }

    /// Set the concurrency margin.
    pub fn with_concurrency_margin(mut self, margin: f64) -> Self {
        self.concurrency_margin = margin;
        self
    }
}
