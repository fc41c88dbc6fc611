use serde::{Serialize, Deserialize};
use serde::de::DeserializeOwned;
use crate::core::error::{Error, ErrorKind, Result};

/// Payload marshaller for record values.
///
/// Every record goes through the store's codec on write and on read, so a
/// store must keep the same codec for the lifetime of its data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Codec {
    #[default]
    Bincode,  // compact, field order sensitive
    Json,     // readable, tolerant of field reordering
}

impl Codec {
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Bincode => bincode::serialize(value)
                .map_err(|e| Error::new(ErrorKind::Encode, e.to_string())),
            Codec::Json => serde_json::to_vec(value)
                .map_err(|e| Error::new(ErrorKind::Encode, e.to_string())),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Codec::Bincode => bincode::deserialize(bytes)
                .map_err(|e| Error::new(ErrorKind::Decode, e.to_string())),
            Codec::Json => serde_json::from_slice(bytes)
                .map_err(|e| Error::new(ErrorKind::Decode, e.to_string())),
        }
    }
}
