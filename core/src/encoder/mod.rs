//! Payload encoders
//!
//! An encoder is a best-effort format transform between a `Value` and the
//! `Payload` a backend stores. It never validates application schema.

mod json;
mod native;

pub use json::JsonEncoder;
pub use native::NativeEncoder;

use std::fmt::Debug;

use tracing::warn;

use crate::errors::SessionResult;
use crate::value::{Payload, Value};

/// Trait implemented by every payload encoder
pub trait Encoder: Send + Sync + Debug {
    /// Which registry entry this encoder came from
    fn kind(&self) -> EncoderKind;

    /// Encode a value into a storable payload
    fn encode(&self, value: &Value) -> SessionResult<Payload>;

    /// Decode a stored payload. An empty payload decodes to an empty map;
    /// malformed input is a `SessionError::Decode`.
    fn decode(&self, payload: &Payload) -> SessionResult<Value>;
}

/// Encoder variants selectable by configuration name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    /// Structured text (JSON)
    Json,
    /// Native serialization (MessagePack)
    Native,
    /// No encoder: payloads pass through unchanged
    Disabled,
}

impl EncoderKind {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => EncoderKind::Json,
            "serialize" | "native" | "msgpack" => EncoderKind::Native,
            "" => EncoderKind::Disabled,
            other => {
                warn!("Unknown parser type '{}', encoding disabled", other);
                EncoderKind::Disabled
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EncoderKind::Json => "json",
            EncoderKind::Native => "serialize",
            EncoderKind::Disabled => "disabled",
        }
    }
}

/// Instantiate the encoder for a kind; `Disabled` yields `None`.
pub fn build_encoder(kind: EncoderKind) -> Option<Box<dyn Encoder>> {
    match kind {
        EncoderKind::Json => Some(Box::new(JsonEncoder)),
        EncoderKind::Native => Some(Box::new(NativeEncoder)),
        EncoderKind::Disabled => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_name() {
        assert_eq!(EncoderKind::from_name("json"), EncoderKind::Json);
        assert_eq!(EncoderKind::from_name("JSON"), EncoderKind::Json);
        assert_eq!(EncoderKind::from_name("serialize"), EncoderKind::Native);
        assert_eq!(EncoderKind::from_name("msgpack"), EncoderKind::Native);
        assert_eq!(EncoderKind::from_name("yaml"), EncoderKind::Disabled);
        assert_eq!(EncoderKind::from_name(""), EncoderKind::Disabled);
    }

    #[test]
    fn test_build_encoder() {
        assert_eq!(build_encoder(EncoderKind::Json).unwrap().kind(), EncoderKind::Json);
        assert_eq!(build_encoder(EncoderKind::Native).unwrap().kind(), EncoderKind::Native);
        assert!(build_encoder(EncoderKind::Disabled).is_none());
    }
}
