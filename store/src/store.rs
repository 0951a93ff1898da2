use std::fmt::Debug;
use std::sync::Arc;

use sessionkit_core::{expiry, Payload, StoreOptions};
use tracing::warn;

/// Backend sub-space selector (logical database for redis)
pub type Partition = u8;

/// Record shape kept by backends that store expiry alongside the payload
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    /// Encoded payload, or the raw bag when no encoder is configured
    pub data: Payload,
    /// Absolute Unix timestamp; `0` never expires
    pub expire: i64,
}

impl SessionRecord {
    pub fn new(data: Payload, expire: i64) -> Self {
        Self { data, expire }
    }

    /// Check if the record is still live at `now`
    pub fn is_live(&self, now: i64) -> bool {
        expiry::is_live(self.expire, now)
    }
}

/// Trait defining the persistence contract every backend satisfies.
///
/// Calls block until the backend answers. Transient failures are logged and
/// reported as `false` / `None`, never raised.
pub trait SessionStore: Send + Sync + Debug {
    /// Whether a live record exists under `name`
    fn has(&self, name: &str, partition: Option<Partition>, options: Option<&StoreOptions>)
        -> bool;

    /// The stored payload, if `has` would be true
    fn get_data(
        &self,
        name: &str,
        partition: Option<Partition>,
        options: Option<&StoreOptions>,
    ) -> Option<Payload>;

    /// Store a payload. `expire_at` is absolute, `0` never expires.
    fn set_data(
        &self,
        name: &str,
        payload: Payload,
        partition: Option<Partition>,
        expire_at: Option<i64>,
        options: Option<&StoreOptions>,
    ) -> bool;

    /// Change only the expiry of a record, creating an empty one if needed.
    /// Past or missing timestamps expire the record immediately.
    fn set_expire(
        &self,
        name: &str,
        partition: Option<Partition>,
        expire_at: Option<i64>,
        options: Option<&StoreOptions>,
    ) -> bool;

    /// Remove a record; removing an absent record succeeds
    fn delete_data(
        &self,
        name: &str,
        partition: Option<Partition>,
        options: Option<&StoreOptions>,
    ) -> bool;

    /// Take an advisory lock
    fn lock(
        &self,
        lock_key: &str,
        partition: Option<Partition>,
        expire_at: Option<i64>,
        options: Option<&StoreOptions>,
    ) -> bool;

    /// Release an advisory lock
    fn unlock(
        &self,
        lock_key: &str,
        partition: Option<Partition>,
        options: Option<&StoreOptions>,
    ) -> bool;
}

/// Type alias for Arc-wrapped SessionStore trait objects
pub type SessionStoreRef = Arc<dyn SessionStore>;

/// Backend variants selectable by configuration name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Request-scoped in-process storage
    InProcess,
    /// External redis server
    Redis,
    /// No backend: persistence operations fail cleanly
    Disabled,
}

impl StoreKind {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "session" | "memory" | "in_process" => StoreKind::InProcess,
            "redis" => StoreKind::Redis,
            "" => StoreKind::Disabled,
            other => {
                warn!("Unknown store type '{}', persistence disabled", other);
                StoreKind::Disabled
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::InProcess => "session",
            StoreKind::Redis => "redis",
            StoreKind::Disabled => "disabled",
        }
    }
}
