//! Pluggable session-state manager
//!
//! A `Session` owns an in-memory bag of values, loads it from a configurable
//! backend on construction and writes it back through a configurable encoder
//! on `write`. Backend and encoder are picked by name from `SessionConfig`;
//! unknown names disable the feature instead of failing.

pub mod fields;
pub mod session;

pub use fields::{PromotedFields, SessionFields};
pub use session::{Session, SessionArgs, SessionBuilder, DEFAULT_STORE};

pub use sessionkit_core::{
    ClockRef, EncoderKind, ManualClock, Payload, SessionBag, SessionConfig, SessionError,
    SessionResult, StoreOptions, SystemClock, Value,
};
pub use sessionkit_store::{
    InProcessStore, Partition, RequestStorage, SessionSpace, SessionStore, SessionStoreRef,
    StoreKind,
};
