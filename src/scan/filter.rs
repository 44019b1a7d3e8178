//! Compiled index filter expressions.

use serde::{Deserialize, Serialize};

use crate::ring::RowKey;
use crate::scan::row::Row;
use crate::scan::value::FieldValue;

/// Bound type for range filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Bound<T> {
    /// Inclusive bound.
    Included(T),
    /// Exclusive bound.
    Excluded(T),
    /// Unbounded (no limit).
    Unbounded,
}

impl Bound<FieldValue> {
    /// Check if a value satisfies this bound as a lower bound.
    pub fn contains_lower(&self, value: &FieldValue) -> bool {
        match self {
            Bound::Included(bound) => value.compare(bound).is_ge(),
            Bound::Excluded(bound) => value.compare(bound).is_gt(),
            Bound::Unbounded => true,
        }
    }

    /// Check if a value satisfies this bound as an upper bound.
    pub fn contains_upper(&self, value: &FieldValue) -> bool {
        match self {
            Bound::Included(bound) => value.compare(bound).is_le(),
            Bound::Excluded(bound) => value.compare(bound).is_lt(),
            Bound::Unbounded => true,
        }
    }
}

/// One compiled filter condition.
///
/// Each condition kind is a variant here rather than a type in a
/// dispatch hierarchy; the single [`matches`](FilterExpression::matches)
/// operation evaluates any of them against a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpression {
    /// Field equals a value.
    Eq {
        /// Field name.
        field: String,
        /// Value to match.
        value: FieldValue,
    },
    /// Field within a value range.
    Range {
        /// Field name.
        field: String,
        /// Lower bound.
        lower: Bound<FieldValue>,
        /// Upper bound.
        upper: Bound<FieldValue>,
    },
    /// Full-text match on a text field.
    Match {
        /// Field name.
        field: String,
        /// Query text.
        text: String,
    },
    /// Geospatial distance filter on a point field encoded as
    /// `lat;lon` text.
    GeoDistance {
        /// Field name.
        field: String,
        /// Center latitude in degrees.
        lat: f64,
        /// Center longitude in degrees.
        lon: f64,
        /// Maximum distance in kilometers.
        max_km: f64,
    },
    /// Continue strictly after a row key. Injected by the coordinator
    /// when resuming a range; never produced by the query compiler.
    AfterKey {
        /// The last key already consumed for the range.
        key: RowKey,
    },
}

impl FilterExpression {
    /// The field this expression constrains, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            FilterExpression::Eq { field, .. }
            | FilterExpression::Range { field, .. }
            | FilterExpression::Match { field, .. }
            | FilterExpression::GeoDistance { field, .. } => Some(field),
            FilterExpression::AfterKey { .. } => None,
        }
    }

    /// Whether this is the injected resume filter.
    pub fn is_resume(&self) -> bool {
        matches!(self, FilterExpression::AfterKey { .. })
    }

    /// Evaluate the expression against a row.
    ///
    /// `AfterKey` is evaluated in row key order here; an index engine
    /// serving a relevance-ranked scan instead interprets it positionally
    /// in its own ranking order.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            FilterExpression::Eq { field, value } => row
                .fields
                .get(field)
                .is_some_and(|cell| cell.compare(value).is_eq()),
            FilterExpression::Range {
                field,
                lower,
                upper,
            } => row.fields.get(field).is_some_and(|cell| {
                lower.contains_lower(cell) && upper.contains_upper(cell)
            }),
            FilterExpression::Match { field, text } => row
                .fields
                .get(field)
                .and_then(FieldValue::as_text)
                .is_some_and(|cell| {
                    let cell = cell.to_lowercase();
                    text.to_lowercase()
                        .split_whitespace()
                        .all(|term| cell.contains(term))
                }),
            FilterExpression::GeoDistance {
                field,
                lat,
                lon,
                max_km,
            } => row
                .fields
                .get(field)
                .and_then(FieldValue::as_text)
                .and_then(parse_point)
                .is_some_and(|(row_lat, row_lon)| {
                    haversine_km(*lat, *lon, row_lat, row_lon) <= *max_km
                }),
            FilterExpression::AfterKey { key } => row.key > *key,
        }
    }
}

fn parse_point(text: &str) -> Option<(f64, f64)> {
    let (lat, lon) = text.split_once(';')?;
    Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}

/// Haversine distance between two points in kilometers.
fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::Token;

    fn row(fields: &[(&str, FieldValue)]) -> Row {
        let mut row = Row::new(Token::new(1), RowKey::new(b"p".to_vec(), b"c".to_vec()), 1);
        for (name, value) in fields {
            row.fields.insert(name.to_string(), value.clone());
        }
        row
    }

    #[test]
    fn test_eq_filter() {
        let filter = FilterExpression::Eq {
            field: "status".into(),
            value: "open".into(),
        };
        assert_eq!(filter.field(), Some("status"));
        assert!(filter.matches(&row(&[("status", "open".into())])));
        assert!(!filter.matches(&row(&[("status", "closed".into())])));
        assert!(!filter.matches(&row(&[])));
    }

    #[test]
    fn test_range_filter() {
        let filter = FilterExpression::Range {
            field: "age".into(),
            lower: Bound::Included(FieldValue::Integer(18)),
            upper: Bound::Excluded(FieldValue::Integer(65)),
        };
        assert!(filter.matches(&row(&[("age", FieldValue::Integer(18))])));
        assert!(filter.matches(&row(&[("age", FieldValue::Integer(40))])));
        assert!(!filter.matches(&row(&[("age", FieldValue::Integer(65))])));
        assert!(!filter.matches(&row(&[("age", FieldValue::Integer(10))])));
    }

    #[test]
    fn test_match_filter() {
        let filter = FilterExpression::Match {
            field: "body".into(),
            text: "quick fox".into(),
        };
        assert!(filter.matches(&row(&[("body", "The Quick brown fox".into())])));
        assert!(!filter.matches(&row(&[("body", "slow brown fox".into())])));
    }

    #[test]
    fn test_geo_filter() {
        // Tokyo station to Shinjuku station is roughly 6.3 km.
        let filter = FilterExpression::GeoDistance {
            field: "location".into(),
            lat: 35.6812,
            lon: 139.7671,
            max_km: 10.0,
        };
        assert!(filter.matches(&row(&[("location", "35.6896;139.7006".into())])));

        let tight = FilterExpression::GeoDistance {
            field: "location".into(),
            lat: 35.6812,
            lon: 139.7671,
            max_km: 1.0,
        };
        assert!(!tight.matches(&row(&[("location", "35.6896;139.7006".into())])));
    }

    #[test]
    fn test_after_key_filter() {
        let marker = RowKey::new(b"p".to_vec(), b"c".to_vec());
        let filter = FilterExpression::AfterKey { key: marker };
        assert!(filter.is_resume());
        assert_eq!(filter.field(), None);

        let mut later = row(&[]);
        later.key = RowKey::new(b"p".to_vec(), b"d".to_vec());
        assert!(filter.matches(&later));

        let same = row(&[]);
        assert!(!filter.matches(&same));
    }
}
