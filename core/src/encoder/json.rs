use crate::encoder::{Encoder, EncoderKind};
use crate::errors::{SessionError, SessionResult};
use crate::value::{Payload, SessionBag, Value};

/// Structured-text encoder.
///
/// Lossy for shapes JSON has no form for: `Bytes` comes back as a list of
/// integers and non-finite floats come back as `Null`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn kind(&self) -> EncoderKind {
        EncoderKind::Json
    }

    fn encode(&self, value: &Value) -> SessionResult<Payload> {
        let json = serde_json::Value::from(value);
        let text = serde_json::to_string(&json).map_err(|e| SessionError::Encode(e.to_string()))?;
        Ok(Payload::Text(text))
    }

    fn decode(&self, payload: &Payload) -> SessionResult<Value> {
        let parsed = match payload {
            Payload::Bag(bag) => return Ok(Value::Map(bag.clone())),
            _ if payload.is_empty() => return Ok(Value::Map(SessionBag::new())),
            Payload::Text(text) => serde_json::from_str::<serde_json::Value>(text),
            Payload::Bytes(bytes) => serde_json::from_slice::<serde_json::Value>(bytes),
        };
        parsed
            .map(Value::from)
            .map_err(|e| SessionError::Decode(format!("invalid JSON payload: {}", e)))
    }
}
