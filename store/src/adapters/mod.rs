//! Storage backends and the registry that builds them from a `StoreKind`.

pub mod in_process;
#[cfg(feature = "redis")]
pub mod redis_store;

pub use in_process::{InProcessStore, RequestStorage, SessionSpace, StorageStatus};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

use std::sync::Arc;

use sessionkit_core::{ClockRef, StoreOptions, SystemClock};
use tracing::{info, warn};

use crate::store::{Partition, SessionStoreRef, StoreKind};

/// Everything a backend factory may need
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub partition: Option<Partition>,
    pub default_ttl: Option<i64>,
    pub options: Option<StoreOptions>,
    /// Request storage handle for the in-process backend
    pub storage: Option<Arc<RequestStorage>>,
    pub clock: ClockRef,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            partition: None,
            default_ttl: None,
            options: None,
            storage: None,
            clock: SystemClock::shared(),
        }
    }
}

/// Build the backend for `kind`. Returns `None` when the kind is disabled or
/// cannot be built with these settings.
pub fn build_store(kind: StoreKind, settings: &StoreSettings) -> Option<SessionStoreRef> {
    match kind {
        StoreKind::InProcess => match &settings.storage {
            Some(storage) => {
                info!("Using in-process session store");
                Some(Arc::new(InProcessStore::new(
                    Arc::clone(storage),
                    Arc::clone(&settings.clock),
                )))
            }
            None => {
                warn!("In-process store selected without a request storage handle");
                None
            }
        },
        #[cfg(feature = "redis")]
        StoreKind::Redis => {
            info!("Using redis session store");
            Some(Arc::new(RedisStore::new(
                settings.partition,
                settings.default_ttl,
                settings.options.as_ref(),
                Arc::clone(&settings.clock),
            )))
        }
        #[cfg(not(feature = "redis"))]
        StoreKind::Redis => {
            warn!("Redis store selected but the `redis` feature is disabled");
            None
        }
        StoreKind::Disabled => None,
    }
}
