//! Global ordering requested by a query.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::scan::row::Row;

/// One field in a field sort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSort {
    /// Field name.
    pub field: String,
    /// Sort descending instead of ascending.
    pub descending: bool,
}

impl FieldSort {
    /// Ascending sort on a field.
    pub fn ascending(field: impl Into<String>) -> Self {
        FieldSort {
            field: field.into(),
            descending: false,
        }
    }

    /// Descending sort on a field.
    pub fn descending(field: impl Into<String>) -> Self {
        FieldSort {
            field: field.into(),
            descending: true,
        }
    }
}

/// The ordering a query requires over its merged result set.
///
/// Compiled by the query layer to a single comparator; rows always
/// tiebreak on their key so the global order is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SortSpec {
    /// Relevance score, highest first.
    Relevance,
    /// One or more field sorts applied in order.
    Fields(Vec<FieldSort>),
}

impl SortSpec {
    /// Compare two rows under this ordering.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        let primary = match self {
            SortSpec::Relevance => {
                let score_a = a.score.unwrap_or(0.0);
                let score_b = b.score.unwrap_or(0.0);
                score_b.total_cmp(&score_a)
            }
            SortSpec::Fields(fields) => {
                let mut ordering = Ordering::Equal;
                for sort in fields {
                    ordering = match (a.fields.get(&sort.field), b.fields.get(&sort.field)) {
                        (Some(left), Some(right)) => {
                            let cmp = left.compare(right);
                            if sort.descending { cmp.reverse() } else { cmp }
                        }
                        // Rows missing the field sort last either way.
                        (Some(_), None) => Ordering::Less,
                        (None, Some(_)) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    };
                    if ordering != Ordering::Equal {
                        break;
                    }
                }
                ordering
            }
        };
        primary.then_with(|| a.key.cmp(&b.key))
    }
}

/// Whether a query must scan all ranges in a single wave.
///
/// A ranked top-K cannot be computed from a subset of ranges, so any
/// relevance scoring or field sort pins concurrency to every range.
/// Filter-only queries accept any sufficient set of matching rows and
/// may use adaptive concurrency.
pub fn requires_full_scan(sort: Option<&SortSpec>) -> bool {
    sort.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::{RowKey, Token};

    fn row(clustering: &[u8], score: Option<f32>) -> Row {
        let mut row = Row::new(
            Token::new(1),
            RowKey::new(b"p".to_vec(), clustering.to_vec()),
            1,
        );
        row.score = score;
        row
    }

    #[test]
    fn test_relevance_orders_by_score_descending() {
        let spec = SortSpec::Relevance;
        let high = row(b"a", Some(0.9));
        let low = row(b"b", Some(0.1));
        assert_eq!(spec.compare(&high, &low), Ordering::Less);
        assert_eq!(spec.compare(&low, &high), Ordering::Greater);
    }

    #[test]
    fn test_relevance_tiebreaks_on_key() {
        let spec = SortSpec::Relevance;
        let first = row(b"a", Some(0.5));
        let second = row(b"b", Some(0.5));
        assert_eq!(spec.compare(&first, &second), Ordering::Less);
    }

    #[test]
    fn test_field_sort_directions() {
        let asc = SortSpec::Fields(vec![FieldSort::ascending("age")]);
        let desc = SortSpec::Fields(vec![FieldSort::descending("age")]);

        let young = row(b"a", None).with_field("age", 20i64);
        let old = row(b"b", None).with_field("age", 60i64);

        assert_eq!(asc.compare(&young, &old), Ordering::Less);
        assert_eq!(desc.compare(&young, &old), Ordering::Greater);
    }

    #[test]
    fn test_field_sort_missing_values_sort_last() {
        let asc = SortSpec::Fields(vec![FieldSort::ascending("age")]);
        let present = row(b"z", None).with_field("age", 99i64);
        let missing = row(b"a", None);
        assert_eq!(asc.compare(&present, &missing), Ordering::Less);
    }

    #[test]
    fn test_secondary_field_breaks_ties() {
        let spec = SortSpec::Fields(vec![
            FieldSort::ascending("dept"),
            FieldSort::descending("age"),
        ]);
        let a = row(b"a", None).with_field("dept", "eng").with_field("age", 30i64);
        let b = row(b"b", None).with_field("dept", "eng").with_field("age", 40i64);
        assert_eq!(spec.compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_full_scan_requirement() {
        assert!(requires_full_scan(Some(&SortSpec::Relevance)));
        assert!(requires_full_scan(Some(&SortSpec::Fields(vec![
            FieldSort::ascending("age")
        ]))));
        assert!(!requires_full_scan(None));
    }
}
