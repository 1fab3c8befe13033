use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::LogResult;

/// The logical unit stored in the log.
///
/// The offset is assigned by the log on append and echoed back on read;
/// callers never supply it. The payload bytes are opaque to the storage
/// layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Record {
    pub offset: u64,
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            offset: 0,
            value: value.into(),
        }
    }

    pub fn serialize(&self) -> LogResult<Vec<u8>> {
        let config = bincode::config::standard();
        Ok(bincode::encode_to_vec(self, config)?)
    }

    pub fn deserialize(data: &[u8]) -> LogResult<Self> {
        let config = bincode::config::standard();
        let (record, _) = bincode::decode_from_slice(data, config).map_err(|e| {
            warn!("Failed to deserialize record: {}", e);
            e
        })?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip() {
        let record = Record {
            offset: 42,
            value: b"some payload".to_vec(),
        };

        let encoded = record.serialize().unwrap();
        let decoded = Record::deserialize(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_deserialize_garbage_fails() {
        // A truncated buffer must surface a decode error, not panic.
        let record = Record::new(vec![0u8; 64]);
        let encoded = record.serialize().unwrap();
        assert!(Record::deserialize(&encoded[..encoded.len() / 2]).is_err());
    }
}
