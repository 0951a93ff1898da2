//! Session storage backends
//!
//! This crate defines the `SessionStore` contract every backend satisfies and
//! ships two implementations: a request-scoped in-process store and a redis
//! store (behind the `redis` feature).

pub mod adapters;
pub mod store;

pub use adapters::{build_store, InProcessStore, RequestStorage, SessionSpace, StorageStatus, StoreSettings};
#[cfg(feature = "redis")]
pub use adapters::RedisStore;
pub use store::{Partition, SessionRecord, SessionStore, SessionStoreRef, StoreKind};
