//! Versioned record envelope.
//!
//! Every value in `kv_store` is written as `{"version": N, "data": ...}`.
//! Values written before the envelope existed (a bare array, object or
//! epoch-millisecond number) are read as version 0 and upgraded on the next
//! write.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("record version {0} is newer than this build supports")]
    UnsupportedVersion(u32),
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    data: Value,
}

pub fn encode<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&EnvelopeRef {
        version: SCHEMA_VERSION,
        data: value,
    })
}

pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, RecordError> {
    let value: Value = serde_json::from_str(raw)?;

    let data = match envelope_of(&value) {
        Some(envelope) if envelope.version > SCHEMA_VERSION => {
            return Err(RecordError::UnsupportedVersion(envelope.version));
        }
        Some(envelope) => envelope.data,
        None => migrate_legacy(value),
    };

    Ok(serde_json::from_value(data)?)
}

fn envelope_of(value: &Value) -> Option<Envelope> {
    let object = value.as_object()?;
    if object.len() != 2 || !object.contains_key("version") || !object.contains_key("data") {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}

// Version 0 stored cooldown timestamps as strings of digits.
fn migrate_legacy(value: Value) -> Value {
    match value {
        Value::String(s) => match s.parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::String(s),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_wraps_in_current_version() {
        let raw = encode(&vec![1, 2, 3]).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], SCHEMA_VERSION);
        assert_eq!(value["data"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn test_decode_reads_legacy_bare_array() {
        let decoded: Vec<i32> = decode("[4, 5]").unwrap();
        assert_eq!(decoded, vec![4, 5]);
    }

    #[test]
    fn test_decode_reads_legacy_millisecond_string() {
        let decoded: i64 = decode("\"1700000000000\"").unwrap();
        assert_eq!(decoded, 1_700_000_000_000);

        let decoded: i64 = decode("1700000000000").unwrap();
        assert_eq!(decoded, 1_700_000_000_000);
    }

    #[test]
    fn test_decode_rejects_future_version() {
        let result = decode::<Vec<i32>>(r#"{"version": 99, "data": []}"#);
        assert!(matches!(result, Err(RecordError::UnsupportedVersion(99))));
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        let result = decode::<Vec<i32>>("[1, 2");
        assert!(matches!(result, Err(RecordError::Malformed(_))));
    }
}
