//! Result rows and their digest encoding.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ring::{RowKey, Token};
use crate::scan::value::FieldValue;

/// One result row returned by a replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Ring position of the row's partition.
    pub token: Token,
    /// Row identity; equality and deduplication key.
    pub key: RowKey,
    /// Decoded field values.
    pub fields: HashMap<String, FieldValue>,
    /// Write timestamp in microseconds; newest wins during
    /// reconciliation.
    pub write_time: i64,
    /// Relevance score, present only for scored scans.
    pub score: Option<f32>,
}

impl Row {
    /// Create a row with no fields.
    pub fn new(token: Token, key: RowKey, write_time: i64) -> Self {
        Row {
            token,
            key,
            fields: HashMap::new(),
            write_time,
            score: None,
        }
    }

    /// Add a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set the relevance score.
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    /// Feed this row's canonical encoding into a digest hasher.
    ///
    /// Scores are excluded: they are derived from the same data the
    /// digest already covers, and floating point derivation is not a
    /// divergence signal.
    pub fn digest_into(&self, hasher: &mut crc32fast::Hasher) {
        hasher.update(&self.key.encode());
        hasher.update(&self.write_time.to_le_bytes());

        let mut names: Vec<&String> = self.fields.keys().collect();
        names.sort();
        for name in names {
            hasher.update(name.as_bytes());
            hasher.update(&self.fields[name].digest_bytes());
        }
    }
}

/// Digest over an ordered row set, used for hash-only replica replies.
pub fn rows_digest(rows: &[Row]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for row in rows {
        row.digest_into(&mut hasher);
    }
    hasher.finalize()
}
