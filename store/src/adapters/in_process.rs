use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use sessionkit_core::{expiry, ClockRef, Payload, StoreOptions};
use tracing::{debug, warn};

use crate::store::{Partition, SessionRecord, SessionStore};

type Region = HashMap<String, SessionRecord>;

/// Lifecycle of a request-scoped storage handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageStatus {
    /// Storage is unavailable; every operation fails
    Disabled,
    /// Storage exists but has not been started for this request
    #[default]
    NotStarted,
    /// Storage is started and readable
    Active,
}

#[derive(Debug, Default)]
struct StorageState {
    status: StorageStatus,
    records: Region,
}

/// Process-wide memory regions keyed by a cookie/token
#[derive(Debug, Default)]
pub struct SessionSpace {
    regions: RwLock<HashMap<String, Region>>,
}

impl SessionSpace {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open the region for `token` as a request-scoped storage handle.
    /// The region is loaded on `start` and written back on `close`.
    pub fn open(self: &Arc<Self>, token: impl Into<String>) -> Arc<RequestStorage> {
        Arc::new(RequestStorage {
            state: RwLock::new(StorageState::default()),
            space: Some((Arc::clone(self), token.into())),
        })
    }

    /// Check whether a region has been flushed for `token`
    pub fn contains(&self, token: &str) -> bool {
        self.regions
            .read()
            .map(|regions| regions.contains_key(token))
            .unwrap_or(false)
    }

    /// Drop the region for `token`
    pub fn discard(&self, token: &str) -> bool {
        match self.regions.write() {
            Ok(mut regions) => regions.remove(token).is_some(),
            Err(e) => {
                warn!("Failed to acquire write lock: {}", e);
                false
            }
        }
    }

    fn load(&self, token: &str) -> Region {
        match self.regions.read() {
            Ok(regions) => regions.get(token).cloned().unwrap_or_default(),
            Err(e) => {
                warn!("Failed to acquire read lock: {}", e);
                Region::new()
            }
        }
    }

    fn store(&self, token: &str, records: Region) {
        match self.regions.write() {
            Ok(mut regions) => {
                regions.insert(token.to_string(), records);
            }
            Err(e) => warn!("Failed to acquire write lock: {}", e),
        }
    }
}

/// Explicitly passed request-scoped key-value storage.
///
/// Opened at request start (`start`), flushed at request end (`close`).
#[derive(Debug, Default)]
pub struct RequestStorage {
    state: RwLock<StorageState>,
    space: Option<(Arc<SessionSpace>, String)>,
}

impl RequestStorage {
    /// A detached handle, not backed by any `SessionSpace`
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A handle whose storage is unavailable
    pub fn disabled() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(StorageState {
                status: StorageStatus::Disabled,
                records: Region::new(),
            }),
            space: None,
        })
    }

    pub fn token(&self) -> Option<&str> {
        self.space.as_ref().map(|(_, token)| token.as_str())
    }

    pub fn status(&self) -> StorageStatus {
        self.read_state()
            .map(|state| state.status)
            .unwrap_or(StorageStatus::Disabled)
    }

    /// Ensure the storage is active, starting it if needed
    pub fn start(&self) -> bool {
        let Some(mut state) = self.write_state() else {
            return false;
        };
        match state.status {
            StorageStatus::Disabled => false,
            StorageStatus::Active => true,
            StorageStatus::NotStarted => {
                if let Some((space, token)) = &self.space {
                    state.records = space.load(token);
                    debug!("Started request storage for token {}", token);
                }
                state.status = StorageStatus::Active;
                true
            }
        }
    }

    /// Flush records back to the owning space and return to `NotStarted`
    pub fn close(&self) -> bool {
        let Some(mut state) = self.write_state() else {
            return false;
        };
        if state.status != StorageStatus::Active {
            return state.status == StorageStatus::NotStarted;
        }
        let records = std::mem::take(&mut state.records);
        if let Some((space, token)) = &self.space {
            space.store(token, records);
            debug!("Flushed request storage for token {}", token);
        }
        state.status = StorageStatus::NotStarted;
        true
    }

    pub fn exists(&self, key: &str) -> bool {
        self.read_state()
            .map(|state| state.records.contains_key(key))
            .unwrap_or(false)
    }

    pub fn get(&self, key: &str) -> Option<SessionRecord> {
        self.read_state()
            .and_then(|state| state.records.get(key).cloned())
    }

    pub fn set(&self, key: &str, record: SessionRecord) -> bool {
        match self.write_state() {
            Some(mut state) => {
                state.records.insert(key.to_string(), record);
                true
            }
            None => false,
        }
    }

    pub fn unset(&self, key: &str) -> bool {
        match self.write_state() {
            Some(mut state) => {
                state.records.remove(key);
                true
            }
            None => false,
        }
    }

    fn read_state(&self) -> Option<RwLockReadGuard<'_, StorageState>> {
        self.state
            .read()
            .map_err(|e| warn!("Failed to acquire read lock: {}", e))
            .ok()
    }

    fn write_state(&self) -> Option<RwLockWriteGuard<'_, StorageState>> {
        self.state
            .write()
            .map_err(|e| warn!("Failed to acquire write lock: {}", e))
            .ok()
    }
}

/// In-process implementation of SessionStore.
///
/// Partitions and options are ignored. Locks are no-ops that always succeed:
/// a single writer per request is assumed.
#[derive(Debug)]
pub struct InProcessStore {
    storage: Arc<RequestStorage>,
    clock: ClockRef,
}

impl InProcessStore {
    pub fn new(storage: Arc<RequestStorage>, clock: ClockRef) -> Self {
        Self { storage, clock }
    }

    pub fn storage(&self) -> &Arc<RequestStorage> {
        &self.storage
    }

    fn live_record(&self, name: &str) -> Option<SessionRecord> {
        if !self.storage.start() {
            return None;
        }
        let now = self.clock.now();
        self.storage
            .get(name)
            .filter(|record| record.is_live(now))
    }
}

impl SessionStore for InProcessStore {
    fn has(&self, name: &str, _partition: Option<Partition>, _options: Option<&StoreOptions>) -> bool {
        self.live_record(name).is_some()
    }

    fn get_data(
        &self,
        name: &str,
        _partition: Option<Partition>,
        _options: Option<&StoreOptions>,
    ) -> Option<Payload> {
        self.live_record(name).map(|record| record.data)
    }

    fn set_data(
        &self,
        name: &str,
        payload: Payload,
        _partition: Option<Partition>,
        expire_at: Option<i64>,
        _options: Option<&StoreOptions>,
    ) -> bool {
        if !self.storage.start() {
            return false;
        }
        let expire = expiry::normalize(expire_at).unwrap_or(expiry::NEVER);
        debug!("Storing session {} (expire {})", name, expire);
        self.storage.set(name, SessionRecord::new(payload, expire))
    }

    fn set_expire(
        &self,
        name: &str,
        _partition: Option<Partition>,
        expire_at: Option<i64>,
        _options: Option<&StoreOptions>,
    ) -> bool {
        if !self.storage.start() {
            return false;
        }
        let expire = expiry::clamp_new_expiry(expire_at, self.clock.now());
        let record = match self.storage.get(name) {
            Some(mut record) => {
                record.expire = expire;
                record
            }
            None => SessionRecord::new(Payload::Text(String::new()), expire),
        };
        debug!("Setting expiry of session {} to {}", name, expire);
        self.storage.set(name, record)
    }

    fn delete_data(
        &self,
        name: &str,
        _partition: Option<Partition>,
        _options: Option<&StoreOptions>,
    ) -> bool {
        if !self.storage.start() {
            return false;
        }
        self.storage.unset(name)
    }

    fn lock(
        &self,
        lock_key: &str,
        _partition: Option<Partition>,
        _expire_at: Option<i64>,
        _options: Option<&StoreOptions>,
    ) -> bool {
        debug!("Advisory lock {} granted (in-process locks never block)", lock_key);
        true
    }

    fn unlock(
        &self,
        lock_key: &str,
        _partition: Option<Partition>,
        _options: Option<&StoreOptions>,
    ) -> bool {
        debug!("Advisory lock {} released", lock_key);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessionkit_core::{ManualClock, SessionBag, Value};

    const NOW: i64 = 1_700_000_000;

    fn store_with_clock() -> (InProcessStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = InProcessStore::new(RequestStorage::new(), clock.clone());
        (store, clock)
    }

    fn payload() -> Payload {
        let mut bag = SessionBag::new();
        bag.insert("user".to_string(), Value::from("alice"));
        Payload::Bag(bag)
    }

    #[test]
    fn test_set_and_get_data() {
        let (store, _) = store_with_clock();
        assert!(!store.has("cart", None, None));
        assert_eq!(store.get_data("cart", None, None), None);

        assert!(store.set_data("cart", payload(), None, None, None));
        assert!(store.has("cart", None, None));
        assert_eq!(store.get_data("cart", None, None), Some(payload()));
        assert_eq!(store.storage().status(), StorageStatus::Active);
    }

    #[test]
    fn test_never_expiring_record() {
        let (store, clock) = store_with_clock();
        store.set_data("cart", payload(), None, Some(expiry::NEVER), None);

        clock.advance(100 * 365 * 24 * 3600);
        assert!(store.has("cart", None, None));
    }

    #[test]
    fn test_absolute_expiry_boundary() {
        let (store, clock) = store_with_clock();
        let expire_at = NOW + 30;
        store.set_data("cart", payload(), None, Some(expire_at), None);

        clock.set(expire_at - 1);
        assert!(store.has("cart", None, None));

        clock.set(expire_at);
        assert!(!store.has("cart", None, None));
        assert_eq!(store.get_data("cart", None, None), None);
    }

    #[test]
    fn test_negative_expiry_is_stored_as_never() {
        let (store, clock) = store_with_clock();
        store.set_data("cart", payload(), None, Some(-5), None);

        assert_eq!(store.storage().get("cart").unwrap().expire, expiry::NEVER);
        clock.advance(1_000_000);
        assert!(store.has("cart", None, None));
    }

    #[test]
    fn test_set_expire_keeps_payload() {
        let (store, clock) = store_with_clock();
        store.set_data("cart", payload(), None, None, None);

        assert!(store.set_expire("cart", None, Some(NOW + 10), None));
        let record = store.storage().get("cart").unwrap();
        assert_eq!(record.data, payload());
        assert_eq!(record.expire, NOW + 10);

        clock.set(NOW + 10);
        assert!(!store.has("cart", None, None));
    }

    #[test]
    fn test_set_expire_in_past_expires_now() {
        let (store, _) = store_with_clock();
        store.set_data("cart", payload(), None, None, None);

        assert!(store.set_expire("cart", None, Some(NOW - 100), None));
        assert_eq!(store.storage().get("cart").unwrap().expire, NOW - 1);
        assert!(!store.has("cart", None, None));
    }

    #[test]
    fn test_set_expire_creates_empty_record() {
        let (store, _) = store_with_clock();

        assert!(store.set_expire("ghost", None, Some(NOW + 60), None));
        let record = store.storage().get("ghost").unwrap();
        assert_eq!(record.data, Payload::Text(String::new()));
        assert_eq!(record.expire, NOW + 60);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (store, _) = store_with_clock();
        store.set_data("cart", payload(), None, None, None);

        assert!(store.delete_data("cart", None, None));
        assert!(!store.has("cart", None, None));
        assert!(store.delete_data("cart", None, None));
    }

    #[test]
    fn test_disabled_storage_fails_cleanly() {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = InProcessStore::new(RequestStorage::disabled(), clock);

        assert!(!store.set_data("cart", payload(), None, None, None));
        assert!(!store.has("cart", None, None));
        assert!(!store.set_expire("cart", None, None, None));
        assert!(!store.delete_data("cart", None, None));
    }

    #[test]
    fn test_locks_never_exclude() {
        let (store, _) = store_with_clock();

        // Both callers are granted the same lock: the in-process store is advisory only.
        assert!(store.lock("cart:lock", None, Some(NOW + 5), None));
        assert!(store.lock("cart:lock", None, Some(NOW + 5), None));
        assert!(store.unlock("cart:lock", None, None));
        assert!(store.unlock("cart:lock", None, None));
    }

    #[test]
    fn test_space_flushes_on_close() {
        let space = SessionSpace::new();
        let clock = Arc::new(ManualClock::new(NOW));

        let first = space.open("cookie-1");
        let store = InProcessStore::new(first.clone(), clock.clone());
        store.set_data("cart", payload(), None, None, None);
        assert!(!space.contains("cookie-1"));
        assert!(first.close());
        assert_eq!(first.status(), StorageStatus::NotStarted);
        assert!(space.contains("cookie-1"));

        let second = InProcessStore::new(space.open("cookie-1"), clock.clone());
        assert_eq!(second.get_data("cart", None, None), Some(payload()));

        let other = InProcessStore::new(space.open("cookie-2"), clock);
        assert!(!other.has("cart", None, None));

        assert!(space.discard("cookie-1"));
        assert!(!space.contains("cookie-1"));
    }
}
