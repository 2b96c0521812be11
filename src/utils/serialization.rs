// src/utils/serialization.rs
//! Serialization utilities for the registry.
//!
//! Provides:
//! - JSON (de)serialization of persisted records
//! - Canonical byte encoding of signed payloads
//! - A base64 serde adapter for binary payload fields

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::StoreError;

/// Serializes a record to JSON bytes for storage.
pub fn to_record<T: Serialize>(data: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(data).map_err(StoreError::from)
}

/// Deserializes a stored JSON record.
pub fn from_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(StoreError::from)
}

/// Canonical bytes of a value that is signed.
///
/// The value is converted to a `serde_json::Value` first; with the default
/// (BTreeMap backed) map, object keys come out sorted, so the encoding does
/// not depend on struct field order.
pub fn canonical_bytes<T: Serialize>(data: &T) -> Result<Vec<u8>, StoreError> {
    let value = serde_json::to_value(data)?;
    Ok(serde_json::to_vec(&value)?)
}

/// Serde adapter storing `Vec<u8>` as standard base64.
pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Blob {
        zeta: u8,
        #[serde(with = "base64_bytes")]
        alpha: Vec<u8>,
    }

    #[test]
    fn test_canonical_bytes_sort_keys() {
        let blob = Blob { zeta: 1, alpha: vec![0xde, 0xad] };
        let bytes = canonical_bytes(&blob).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"alpha":"3q0=","zeta":1}"#);
    }

    #[test]
    fn test_record_decode_error_is_codec() {
        let err = from_record::<Blob>(b"{not json").unwrap_err();
        assert!(matches!(err, StoreError::Codec(_)));
    }

    #[test]
    fn test_record_round_trip_keeps_bytes() {
        let blob = Blob { zeta: 9, alpha: vec![0, 1, 2, 255] };
        let back: Blob = from_record(&to_record(&blob).unwrap()).unwrap();
        assert_eq!(back, blob);
    }
}
