// Core session-state building blocks shared by the store and session crates:
// - Value model and session bag
// - Expiry arithmetic and the injectable clock
// - Configuration loading
// - Payload encoders
// - Shared error types

// Export value module - Session values, bag and payload shapes
pub mod value;
pub use value::*;

// Export clock module - Injectable "now"
pub mod clock;
pub use clock::{Clock, ClockRef, ManualClock, SystemClock};

// Export expiry module - Expiration normalization and lazy-expiry checks
pub mod expiry;

// Export config module - Configuration loading
pub mod config;
pub use config::*;

// Export encoder module - Structured-text and native payload encoders
pub mod encoder;
pub use encoder::{build_encoder, Encoder, EncoderKind, JsonEncoder, NativeEncoder};

// Export errors module - Shared error types
pub mod errors;
pub use errors::*;
