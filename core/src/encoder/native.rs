use crate::encoder::{Encoder, EncoderKind};
use crate::errors::{SessionError, SessionResult};
use crate::value::{Payload, SessionBag, Value};

/// Native-serialization encoder (MessagePack). Round-trips every `Value`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEncoder;

impl Encoder for NativeEncoder {
    fn kind(&self) -> EncoderKind {
        EncoderKind::Native
    }

    fn encode(&self, value: &Value) -> SessionResult<Payload> {
        rmp_serde::to_vec(value)
            .map(Payload::Bytes)
            .map_err(|e| SessionError::Encode(e.to_string()))
    }

    fn decode(&self, payload: &Payload) -> SessionResult<Value> {
        let bytes: &[u8] = match payload {
            Payload::Bag(bag) => return Ok(Value::Map(bag.clone())),
            _ if payload.is_empty() => return Ok(Value::Map(SessionBag::new())),
            Payload::Text(text) => text.as_bytes(),
            Payload::Bytes(bytes) => bytes,
        };
        rmp_serde::from_slice(bytes)
            .map_err(|e| SessionError::Decode(format!("invalid MessagePack payload: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_nested_containers() {
        let mut inner = SessionBag::new();
        inner.insert("blob".to_string(), Value::Bytes(vec![0, 159, 146, 150]));
        inner.insert("ratio".to_string(), Value::Float(-0.125));
        inner.insert("empty".to_string(), Value::Map(SessionBag::new()));

        let mut bag = SessionBag::new();
        bag.insert("inner".to_string(), Value::Map(inner));
        bag.insert(
            "list".to_string(),
            Value::List(vec![
                Value::Null,
                Value::Bool(true),
                Value::Int(i64::MIN),
                Value::List(vec![Value::from("deep")]),
            ]),
        );
        let value = Value::Map(bag);

        let encoder = NativeEncoder;
        let payload = encoder.encode(&value).unwrap();
        assert!(matches!(payload, Payload::Bytes(_)));
        assert_eq!(encoder.decode(&payload).unwrap(), value);
    }

    #[test]
    fn test_round_trip_scalars() {
        let encoder = NativeEncoder;
        for value in [
            Value::Null,
            Value::Bool(false),
            Value::Int(42),
            Value::from("text"),
            Value::Bytes(Vec::new()),
        ] {
            let payload = encoder.encode(&value).unwrap();
            assert_eq!(encoder.decode(&payload).unwrap(), value);
        }
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let result = NativeEncoder.decode(&Payload::Bytes(vec![0xc1]));
        assert!(matches!(result, Err(SessionError::Decode(_))));
    }

    #[test]
    fn test_empty_payload_is_empty_map() {
        let decoded = NativeEncoder.decode(&Payload::Bytes(Vec::new())).unwrap();
        assert_eq!(decoded, Value::Map(SessionBag::new()));
    }
}
