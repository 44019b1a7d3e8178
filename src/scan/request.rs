//! Inbound search scans and outbound per-range requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ring::{RowKey, TokenRange};
use crate::scan::filter::FilterExpression;
use crate::scan::sort::SortSpec;
use crate::topology::ConsistencyLevel;

/// A search scan as handed over by the query compiler.
#[derive(Debug, Clone)]
pub struct SearchScan {
    /// Keyspace to scan.
    pub keyspace: String,
    /// Table to scan.
    pub table: String,
    /// Requested key range; defaults to the whole ring.
    pub range: TokenRange,
    /// Snapshot timestamp the scan reads as of.
    pub timestamp: DateTime<Utc>,
    /// Compiled filter expressions.
    pub filters: Vec<FilterExpression>,
    /// Requested global ordering, if any.
    pub sort: Option<SortSpec>,
    /// Maximum rows to return.
    pub limit: usize,
    /// Consistency level for every range read.
    pub consistency: ConsistencyLevel,
    /// Opaque continuation token from a previous page.
    pub resume_token: Option<Vec<u8>>,
}

impl SearchScan {
    /// Create a scan over a table with default settings.
    pub fn new(keyspace: impl Into<String>, table: impl Into<String>) -> Self {
        SearchScan {
            keyspace: keyspace.into(),
            table: table.into(),
            range: TokenRange::full_ring(),
            timestamp: Utc::now(),
            filters: Vec::new(),
            sort: None,
            limit: 100,
            consistency: ConsistencyLevel::One,
            resume_token: None,
        }
    }

    /// Restrict the scan to a key range.
    pub fn with_range(mut self, range: TokenRange) -> Self {
        self.range = range;
        self
    }

    /// Pin the snapshot timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Add a filter expression.
    pub fn with_filter(mut self, filter: FilterExpression) -> Self {
        self.filters.push(filter);
        self
    }

    /// Request a global ordering.
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set the row limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the consistency level.
    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = consistency;
        self
    }

    /// Resume from a previous page's continuation token.
    pub fn with_resume_token(mut self, token: Vec<u8>) -> Self {
        self.resume_token = Some(token);
        self
    }
}

/// The request dispatched to one sub-range's replicas.
///
/// Immutable once dispatched; resuming a range clones the request with an
/// injected continue-after filter instead of mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeScanRequest {
    /// Keyspace to scan.
    pub keyspace: String,
    /// Table to scan.
    pub table: String,
    /// Snapshot timestamp the scan reads as of.
    pub timestamp: DateTime<Utc>,
    /// The sub-range this request covers.
    pub range: TokenRange,
    /// Compiled filter expressions, including any injected resume filter.
    pub filters: Vec<FilterExpression>,
    /// Maximum rows the replica should return.
    pub limit: usize,
    /// Ordering the replica must return rows in. Resume markers are
    /// positional in this order; key order when absent.
    pub sort: Option<SortSpec>,
}

impl RangeScanRequest {
    /// Build the per-range request for one sub-range of a scan.
    pub fn for_range(scan: &SearchScan, range: TokenRange, limit: usize) -> Self {
        RangeScanRequest {
            keyspace: scan.keyspace.clone(),
            table: scan.table.clone(),
            timestamp: scan.timestamp,
            range,
            filters: scan.filters.clone(),
            limit,
            sort: scan.sort.clone(),
        }
    }

    /// Whether the replica should attach relevance scores.
    pub fn scored(&self) -> bool {
        matches!(self.sort, Some(SortSpec::Relevance))
    }

    /// Clone this request with a continue-after marker injected.
    pub fn with_resume_after(&self, key: RowKey) -> Self {
        let mut next = self.clone();
        next.filters.push(FilterExpression::AfterKey { key });
        next
    }

    /// The resume marker injected into this request, if any.
    pub fn resume_after(&self) -> Option<&RowKey> {
        self.filters.iter().rev().find_map(|filter| match filter {
            FilterExpression::AfterKey { key } => Some(key),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::Token;
    use crate::scan::FieldValue;

    #[test]
    fn test_scan_builder() {
        let scan = SearchScan::new("media", "articles")
            .with_limit(10)
            .with_consistency(ConsistencyLevel::Quorum)
            .with_filter(FilterExpression::Eq {
                field: "status".into(),
                value: FieldValue::Text("published".into()),
            })
            .with_sort(SortSpec::Relevance);

        assert_eq!(scan.keyspace, "media");
        assert_eq!(scan.limit, 10);
        assert_eq!(scan.consistency, ConsistencyLevel::Quorum);
        assert_eq!(scan.filters.len(), 1);
        assert!(scan.range.is_full_ring());
    }

    #[test]
    fn test_range_request_inherits_ordering() {
        let scan = SearchScan::new("media", "articles").with_sort(SortSpec::Relevance);
        let range = TokenRange::new(Token::new(0), Token::new(10));
        let request = RangeScanRequest::for_range(&scan, range, 5);

        assert!(request.scored());
        assert_eq!(request.sort, Some(SortSpec::Relevance));
        assert_eq!(request.limit, 5);
        assert_eq!(request.range, range);

        let unsorted = RangeScanRequest::for_range(&SearchScan::new("m", "a"), range, 5);
        assert!(!unsorted.scored());
        assert!(unsorted.sort.is_none());
    }

    #[test]
    fn test_resume_injection() {
        let scan = SearchScan::new("media", "articles");
        let range = TokenRange::new(Token::new(0), Token::new(10));
        let request = RangeScanRequest::for_range(&scan, range, 5);
        assert!(request.resume_after().is_none());

        let marker = RowKey::new(b"p".to_vec(), b"c".to_vec());
        let resumed = request.with_resume_after(marker.clone());
        assert_eq!(resumed.resume_after(), Some(&marker));
        // The original request is untouched.
        assert!(request.resume_after().is_none());
    }
}
