//! Compiled scan request and result row model.
//!
//! This is the boundary with the query compiler: filters arrive already
//! compiled to [`FilterExpression`] values and ordering to a [`SortSpec`],
//! so the coordinator never parses a query language.

pub mod filter;
pub mod request;
pub mod row;
pub mod sort;
pub mod value;

pub use self::filter::{Bound, FilterExpression};
pub use self::request::{RangeScanRequest, SearchScan};
pub use self::row::Row;
pub use self::sort::{FieldSort, SortSpec, requires_full_scan};
pub use self::value::FieldValue;
