//! Typed cell values used by filters and field sorts.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A typed field value decoded from a stored column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Raw bytes in the store's native encoding.
    Bytes(Vec<u8>),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 text.
    Text(String),
}

impl FieldValue {
    /// Total-order comparison. Values of the same kind compare naturally;
    /// mixed kinds fall back to a fixed kind rank so sorts stay
    /// deterministic.
    pub fn compare(&self, other: &FieldValue) -> Ordering {
        use FieldValue::*;
        match (self, other) {
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Integer(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Integer(b)) => a.total_cmp(&(*b as f64)),
            (Text(a), Text(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            FieldValue::Bytes(_) => 0,
            FieldValue::Integer(_) => 1,
            FieldValue::Float(_) => 2,
            FieldValue::Text(_) => 3,
        }
    }

    /// The value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Canonical bytes for digest hashing.
    pub fn digest_bytes(&self) -> Vec<u8> {
        match self {
            FieldValue::Bytes(bytes) => {
                let mut out = vec![0u8];
                out.extend_from_slice(bytes);
                out
            }
            FieldValue::Integer(value) => {
                let mut out = vec![1u8];
                out.extend_from_slice(&value.to_le_bytes());
                out
            }
            FieldValue::Float(value) => {
                let mut out = vec![2u8];
                out.extend_from_slice(&value.to_le_bytes());
                out
            }
            FieldValue::Text(text) => {
                let mut out = vec![3u8];
                out.extend_from_slice(text.as_bytes());
                out
            }
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}
