//! CBOR and JSON helpers.
//!
//! Records and change entries are stored as CBOR inside log frames. Pull and
//! push bodies travel as JSON, which is what the server speaks.

use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value as CBOR.
pub fn to_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
    Ok(bytes)
}

/// Decodes a value from CBOR.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

/// Encodes a value as JSON.
pub fn to_json<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Decodes a value from JSON.
pub fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Payload, Record};
    use serde_json::json;

    fn car() -> Record {
        let mut payload = Payload::new();
        payload.insert("name".into(), json!("Huracan"));
        payload.insert("price".into(), json!(580));
        Record::new("car1", "cars", payload).with_revision(4)
    }

    #[test]
    fn record_survives_cbor() {
        let record = car();
        let bytes = to_cbor(&record).unwrap();
        assert_eq!(from_cbor::<Record>(&bytes).unwrap(), record);
    }

    #[test]
    fn garbage_cbor_is_an_error() {
        assert!(matches!(
            from_cbor::<Record>(&[0xFF, 0x00]),
            Err(ProtocolError::CborDecode(_))
        ));
    }

    #[test]
    fn garbage_json_is_an_error() {
        assert!(matches!(
            from_json::<Record>(b"{not json"),
            Err(ProtocolError::Json(_))
        ));
    }
}
