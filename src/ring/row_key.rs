//! Row identity and its wire encoding.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, XystonError};
use crate::util::varint;

/// The identity of a result row: partition key plus clustering key bytes.
///
/// Two row keys are equal exactly when their byte encodings are equal.
/// The encoding length-prefixes each component, matching the store's
/// native key framing, so an encoded key round-trips as an opaque value
/// without the coordinator parsing the component encodings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey {
    /// Partition key bytes in the store's native encoding.
    pub partition: Vec<u8>,
    /// Clustering key bytes in the store's native encoding.
    pub clustering: Vec<u8>,
}

impl RowKey {
    /// Create a row key from partition and clustering key bytes.
    pub fn new(partition: impl Into<Vec<u8>>, clustering: impl Into<Vec<u8>>) -> Self {
        RowKey {
            partition: partition.into(),
            clustering: clustering.into(),
        }
    }

    /// Encode to the length-prefixed wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.partition.len() + self.clustering.len() + 4);
        varint::encode_bytes_into(&mut buf, &self.partition);
        varint::encode_bytes_into(&mut buf, &self.clustering);
        buf
    }

    /// Decode from the wire form, requiring the input to be consumed
    /// exactly.
    pub fn decode(bytes: &[u8]) -> Result<RowKey> {
        let (partition, used) = varint::decode_bytes(bytes)?;
        let (clustering, used2) = varint::decode_bytes(&bytes[used..])?;

        if used + used2 != bytes.len() {
            return Err(XystonError::serialization(format!(
                "trailing bytes after row key: {}",
                bytes.len() - used - used2
            )));
        }

        Ok(RowKey {
            partition: partition.to_vec(),
            clustering: clustering.to_vec(),
        })
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.partition {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "/")?;
        for byte in &self.clustering {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
