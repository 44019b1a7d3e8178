//! Expected-yield estimation used to size wave concurrency.

use tracing::debug;

use crate::error::{Result, XystonError};
use crate::scan::FilterExpression;

/// Selectivity assumed for a full-text match with no better statistic.
const MATCH_SELECTIVITY: f64 = 0.1;

/// Selectivity assumed for a value-range filter.
const RANGE_SELECTIVITY: f64 = 1.0 / 3.0;

/// Selectivity assumed for a geo distance filter.
const GEO_SELECTIVITY: f64 = 0.05;

/// Yield assumed when statistics are unavailable: one row per range, so
/// the wave scans wide and finishes sooner rather than stalling narrow.
const FALLBACK_ROWS_PER_RANGE: f64 = 1.0;

/// Per-table cardinality and row-count statistics.
///
/// Provided by the host's statistics subsystem; the estimator only ever
/// reads it.
pub trait IndexStats: Send + Sync {
    /// Total rows in a table.
    fn row_count(&self, keyspace: &str, table: &str) -> Result<u64>;

    /// Distinct values of a field in a table.
    fn cardinality(&self, keyspace: &str, table: &str, field: &str) -> Result<u64>;
}

/// Estimates matching rows per range for a filtered scan.
pub struct YieldEstimator<'a> {
    stats: &'a dyn IndexStats,
    /// Fraction reserved as an under-estimate so waves lean toward
    /// scanning more ranges than strictly predicted.
    margin: f64,
}

impl<'a> YieldEstimator<'a> {
    /// Create an estimator over the given statistics source.
    pub fn new(stats: &'a dyn IndexStats, margin: f64) -> Self {
        YieldEstimator { stats, margin }
    }

    /// Expected matching rows per range.
    ///
    /// Uses the most selective available filter statistic, discounted by
    /// the configured margin. Missing or invalid statistics degrade to a
    /// conservative one-row-per-range estimate instead of failing.
    pub fn rows_per_range(
        &self,
        keyspace: &str,
        table: &str,
        filters: &[FilterExpression],
        range_count: usize,
    ) -> f64 {
        match self.try_rows_per_range(keyspace, table, filters, range_count) {
            Ok(estimate) => estimate,
            Err(error) => {
                debug!(%error, keyspace, table, "yield estimate degraded to fallback");
                FALLBACK_ROWS_PER_RANGE
            }
        }
    }

    fn try_rows_per_range(
        &self,
        keyspace: &str,
        table: &str,
        filters: &[FilterExpression],
        range_count: usize,
    ) -> Result<f64> {
        if range_count == 0 {
            return Err(XystonError::estimator("no ranges to estimate over"));
        }

        let total_rows = self.stats.row_count(keyspace, table)? as f64;
        if total_rows <= 0.0 {
            return Err(XystonError::estimator(format!(
                "no row count for {keyspace}.{table}"
            )));
        }

        let mut selectivity = 1.0f64;
        for filter in filters {
            let this = match filter {
                FilterExpression::Eq { field, .. } => {
                    let cardinality = self.stats.cardinality(keyspace, table, field)?;
                    if cardinality == 0 {
                        return Err(XystonError::estimator(format!(
                            "zero cardinality for field {field}"
                        )));
                    }
                    1.0 / cardinality as f64
                }
                FilterExpression::Range { .. } => RANGE_SELECTIVITY,
                FilterExpression::Match { .. } => MATCH_SELECTIVITY,
                FilterExpression::GeoDistance { .. } => GEO_SELECTIVITY,
                // Resume markers narrow a page, not the match set.
                FilterExpression::AfterKey { .. } => continue,
            };
            selectivity = selectivity.min(this);
        }

        let per_range = total_rows * selectivity / range_count as f64;
        Ok((per_range * (1.0 - self.margin)).max(0.0))
    }
}

/// Derive wave concurrency from a limit and an expected per-range yield.
///
/// Never less than one, never more than the remaining range count.
pub fn concurrency_for(limit: usize, rows_per_range: f64, remaining_ranges: usize) -> usize {
    if remaining_ranges == 0 {
        return 0;
    }
    if rows_per_range <= 0.0 {
        return remaining_ranges;
    }
    let wanted = (limit as f64 / rows_per_range).ceil() as usize;
    wanted.clamp(1, remaining_ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::{Bound, FieldValue};
    use std::collections::HashMap;

    struct FixedStats {
        rows: u64,
        cardinalities: HashMap<String, u64>,
    }

    impl IndexStats for FixedStats {
        fn row_count(&self, _keyspace: &str, _table: &str) -> Result<u64> {
            Ok(self.rows)
        }

        fn cardinality(&self, _keyspace: &str, _table: &str, field: &str) -> Result<u64> {
            self.cardinalities
                .get(field)
                .copied()
                .ok_or_else(|| XystonError::estimator(format!("no stats for {field}")))
        }
    }

    struct BrokenStats;

    impl IndexStats for BrokenStats {
        fn row_count(&self, _keyspace: &str, _table: &str) -> Result<u64> {
            Err(XystonError::estimator("statistics store offline"))
        }

        fn cardinality(&self, _keyspace: &str, _table: &str, _field: &str) -> Result<u64> {
            Err(XystonError::estimator("statistics store offline"))
        }
    }

    fn eq_filter(field: &str) -> FilterExpression {
        FilterExpression::Eq {
            field: field.into(),
            value: FieldValue::Text("x".into()),
        }
    }

    #[test]
    fn test_most_selective_filter_wins() {
        let stats = FixedStats {
            rows: 10_000,
            cardinalities: HashMap::from([("user".to_string(), 1_000), ("kind".to_string(), 4)]),
        };
        let estimator = YieldEstimator::new(&stats, 0.0);

        // user (1/1000) beats kind (1/4): 10000/1000/10 ranges = 1.
        let estimate = estimator.rows_per_range(
            "ks",
            "t",
            &[eq_filter("kind"), eq_filter("user")],
            10,
        );
        assert!((estimate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_margin_discounts_estimate() {
        let stats = FixedStats {
            rows: 1_000,
            cardinalities: HashMap::new(),
        };
        let estimator = YieldEstimator::new(&stats, 0.1);

        let range_filter = FilterExpression::Range {
            field: "age".into(),
            lower: Bound::Unbounded,
            upper: Bound::Included(FieldValue::Integer(10)),
        };
        // 1000 * (1/3) / 10 = 33.33, discounted by 10% to 30.
        let estimate = estimator.rows_per_range("ks", "t", &[range_filter], 10);
        assert!((estimate - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_fallback_on_missing_stats() {
        let estimator = YieldEstimator::new(&BrokenStats, 0.1);
        let estimate = estimator.rows_per_range("ks", "t", &[eq_filter("user")], 10);
        assert_eq!(estimate, FALLBACK_ROWS_PER_RANGE);
    }

    #[test]
    fn test_concurrency_bounds() {
        // ceil(10 / 3) = 4, within the 4 remaining ranges.
        assert_eq!(concurrency_for(10, 3.0, 4), 4);
        // Plentiful yield still scans at least one range.
        assert_eq!(concurrency_for(10, 1_000.0, 4), 1);
        // Starved yield is capped at the remaining ranges.
        assert_eq!(concurrency_for(10, 0.01, 4), 4);
        // Unknown yield scans everything left.
        assert_eq!(concurrency_for(10, 0.0, 7), 7);
        assert_eq!(concurrency_for(10, 3.0, 0), 0);
    }
}
