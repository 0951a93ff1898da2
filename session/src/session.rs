use std::sync::Arc;

use sessionkit_core::{
    build_encoder, expiry, ClockRef, Encoder, EncoderKind, Payload, SessionBag, SessionConfig,
    SessionError, SessionResult, StoreOptions, SystemClock, Value,
};
use sessionkit_store::{
    build_store, Partition, RequestStorage, SessionStoreRef, StoreKind, StoreSettings,
};
use tracing::{debug, info, warn};

use crate::fields::{PromotedFields, SessionFields};

/// Store used when the configuration names none
pub const DEFAULT_STORE: &str = "session";

/// Per-session constructor arguments. Only `Some` values override the
/// configured defaults.
#[derive(Debug, Clone, Default)]
pub struct SessionArgs {
    pub session_name: Option<String>,
    pub lock_key_name: Option<String>,
    pub partition: Option<Partition>,
    /// Relative expiration offset in seconds
    pub expire: Option<i64>,
    /// Relative lock expiration offset in seconds
    pub lock_expire: Option<i64>,
    pub options: Option<StoreOptions>,
}

impl SessionArgs {
    pub fn named(session_name: impl Into<String>) -> Self {
        Self {
            session_name: Some(session_name.into()),
            ..Default::default()
        }
    }

    fn into_overrides(self) -> SessionConfig {
        SessionConfig {
            session_name: self.session_name,
            lock_key_name: self.lock_key_name,
            partition: self.partition,
            expire: expiry::normalize(self.expire),
            lock_expire: expiry::normalize(self.lock_expire),
            store_options: self.options,
            ..Default::default()
        }
    }
}

/// Builder that resolves configuration, encoder and backend, then loads the
/// session.
#[derive(Debug)]
pub struct SessionBuilder<F: SessionFields = PromotedFields> {
    config: SessionConfig,
    args: SessionArgs,
    storage: Option<Arc<RequestStorage>>,
    store: Option<SessionStoreRef>,
    clock: ClockRef,
    fields: F,
}

impl SessionBuilder<PromotedFields> {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            fields: PromotedFields::new(config.promoted_fields.iter().cloned()),
            config: config.clone(),
            args: SessionArgs::default(),
            storage: None,
            store: None,
            clock: SystemClock::shared(),
        }
    }
}

impl<F: SessionFields> SessionBuilder<F> {
    pub fn args(mut self, args: SessionArgs) -> Self {
        self.args = args;
        self
    }

    /// Request storage handle for the in-process store
    pub fn storage(mut self, storage: Arc<RequestStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use this backend instead of the one named in the configuration
    pub fn store(mut self, store: SessionStoreRef) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: ClockRef) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the promoted-field set with a typed implementation
    pub fn fields<G: SessionFields>(self, fields: G) -> SessionBuilder<G> {
        SessionBuilder {
            config: self.config,
            args: self.args,
            storage: self.storage,
            store: self.store,
            clock: self.clock,
            fields,
        }
    }

    /// Resolve everything and load the stored session, if any.
    ///
    /// Unknown store or parser names leave the feature disabled instead of
    /// failing: persistence calls then report `false`.
    pub fn open(self) -> Session<F> {
        let config = self.config.merge(&self.args.into_overrides());

        let encoder_kind = config
            .parser
            .as_deref()
            .map(EncoderKind::from_name)
            .unwrap_or(EncoderKind::Disabled);
        let encoder = build_encoder(encoder_kind);

        let store = self.store.or_else(|| {
            let kind = StoreKind::from_name(config.store.as_deref().unwrap_or(DEFAULT_STORE));
            let settings = StoreSettings {
                partition: config.partition,
                default_ttl: config.default_ttl,
                options: config.store_options.clone(),
                storage: self.storage,
                clock: Arc::clone(&self.clock),
            };
            build_store(kind, &settings)
        });
        if store.is_none() {
            warn!("No session store resolved; persistence is disabled");
        }

        let mut session = Session {
            session_name: config.session_name.unwrap_or_default(),
            lock_key_name: config.lock_key_name.unwrap_or_default(),
            partition: config.partition,
            expire: expiry::normalize(config.expire),
            lock_expire: expiry::normalize(config.lock_expire),
            options: config.store_options,
            data: SessionBag::new(),
            fields: self.fields,
            store,
            encoder,
            clock: self.clock,
        };
        session.load();
        session
    }
}

/// A session: an in-memory bag bound to a named backend record.
///
/// Mutations stay in memory until `write`.
#[derive(Debug)]
pub struct Session<F: SessionFields = PromotedFields> {
    session_name: String,
    lock_key_name: String,
    partition: Option<Partition>,
    expire: Option<i64>,
    lock_expire: Option<i64>,
    options: Option<StoreOptions>,
    data: SessionBag,
    fields: F,
    store: Option<SessionStoreRef>,
    encoder: Option<Box<dyn Encoder>>,
    clock: ClockRef,
}

impl Session<PromotedFields> {
    pub fn builder(config: &SessionConfig) -> SessionBuilder<PromotedFields> {
        SessionBuilder::new(config)
    }
}

impl<F: SessionFields> Session<F> {
    fn load(&mut self) {
        if self.store.is_none() {
            return;
        }
        if self.session_name.is_empty() {
            debug!("Session name is empty, skipping initial load");
            return;
        }
        match self.get_data(None) {
            Ok(Some(data)) => {
                self.set_data(data, false);
                info!("Loaded session {}", self.session_name);
            }
            Ok(None) => debug!("No stored data for session {}", self.session_name),
            Err(e) => warn!("Failed to load session {}: {}", self.session_name, e),
        }
    }

    fn require_name(&self) -> SessionResult<&str> {
        if self.session_name.is_empty() {
            return Err(SessionError::MissingSessionName);
        }
        Ok(&self.session_name)
    }

    fn require_lock_key(&self) -> SessionResult<&str> {
        if self.lock_key_name.is_empty() {
            return Err(SessionError::MissingLockKey);
        }
        Ok(&self.lock_key_name)
    }

    fn resolve_options<'a>(&'a self, options: Option<&'a StoreOptions>) -> Option<&'a StoreOptions> {
        options.or(self.options.as_ref())
    }

    fn decode(&self, payload: Payload) -> SessionResult<Value> {
        match &self.encoder {
            Some(encoder) => encoder.decode(&payload),
            None => Ok(payload.into_value()),
        }
    }

    /// Merge (or, with `replace`, swap in) a map of values. Non-map input is
    /// ignored and reported as `false`.
    pub fn set_data(&mut self, data: Value, replace: bool) -> bool {
        let Value::Map(incoming) = data else {
            debug!("Ignoring non-map session data");
            return false;
        };

        for (name, value) in &incoming {
            if !value.is_null() && self.fields.is_promoted(name) {
                self.fields.mirror(name, value);
            }
        }

        if replace {
            self.data = incoming;
        } else {
            self.data.extend(incoming);
        }
        true
    }

    /// Whether a live record exists for this session
    pub fn has(&self, options: Option<&StoreOptions>) -> SessionResult<bool> {
        let name = self.require_name()?;
        let Some(store) = &self.store else {
            return Ok(false);
        };
        Ok(store.has(name, self.partition, self.resolve_options(options)))
    }

    /// Fetch and decode the stored data, without touching the in-memory bag
    pub fn get_data(&self, options: Option<&StoreOptions>) -> SessionResult<Option<Value>> {
        let name = self.require_name()?;
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let options = self.resolve_options(options);
        if !store.has(name, self.partition, options) {
            return Ok(None);
        }
        match store.get_data(name, self.partition, options) {
            Some(payload) => self.decode(payload).map(Some),
            None => Ok(None),
        }
    }

    /// Persist the bag.
    ///
    /// `expire_at` is an absolute timestamp overriding the instance offset.
    /// Negative expiries are dropped rather than forwarded.
    pub fn write(
        &self,
        partition: Option<Partition>,
        expire_at: Option<i64>,
        options: Option<&StoreOptions>,
    ) -> SessionResult<bool> {
        let name = self.require_name()?;
        let Some(store) = &self.store else {
            debug!("No session store, not writing {}", name);
            return Ok(false);
        };

        let partition = partition.or(self.partition);
        let expire_at = expiry::resolve_write_expiry(expire_at, self.expire, self.clock.now());

        let mut outgoing = self.fields.snapshot();
        outgoing.extend(self.data.iter().map(|(k, v)| (k.clone(), v.clone())));

        let payload = match &self.encoder {
            Some(encoder) => encoder.encode(&Value::Map(outgoing))?,
            None => Payload::Bag(outgoing),
        };

        debug!("Writing session {} (expire {:?})", name, expire_at);
        Ok(store.set_data(name, payload, partition, expire_at, self.resolve_options(options)))
    }

    /// Set the absolute expiry of the stored record. Past, negative or missing
    /// timestamps expire it immediately.
    pub fn set_expire(
        &self,
        expire_at: Option<i64>,
        options: Option<&StoreOptions>,
    ) -> SessionResult<bool> {
        let name = self.require_name()?;
        let Some(store) = &self.store else {
            return Ok(false);
        };
        Ok(store.set_expire(
            name,
            self.partition,
            expiry::normalize(expire_at),
            self.resolve_options(options),
        ))
    }

    /// Remove the stored record; the in-memory bag is left as is
    pub fn delete_data(&self, options: Option<&StoreOptions>) -> SessionResult<bool> {
        let name = self.require_name()?;
        let Some(store) = &self.store else {
            return Ok(false);
        };
        Ok(store.delete_data(name, self.partition, self.resolve_options(options)))
    }

    /// Take the advisory lock named by `lock_key_name`.
    ///
    /// Nothing stops a caller that skips this: the lock only guards callers
    /// that cooperate.
    pub fn lock(&self, options: Option<&StoreOptions>) -> SessionResult<bool> {
        let lock_key = self.require_lock_key()?;
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let expire_at = expiry::resolve_write_expiry(None, self.lock_expire, self.clock.now());
        Ok(store.lock(lock_key, self.partition, expire_at, self.resolve_options(options)))
    }

    pub fn unlock(&self, options: Option<&StoreOptions>) -> SessionResult<bool> {
        let lock_key = self.require_lock_key()?;
        let Some(store) = &self.store else {
            return Ok(false);
        };
        Ok(store.unlock(lock_key, self.partition, self.resolve_options(options)))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Write a value into the bag, mirroring it onto the promoted field of the
    /// same name
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if self.fields.is_promoted(&name) {
            self.fields.mirror(&name, &value);
        }
        self.data.insert(name, value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.data.remove(name)
    }

    /// Present and not null
    pub fn data_has(&self, name: &str) -> bool {
        self.data.get(name).is_some_and(|value| !value.is_null())
    }

    pub fn current_data(&self) -> &SessionBag {
        &self.data
    }

    pub fn fields(&self) -> &F {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut F {
        &mut self.fields
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn lock_key_name(&self) -> &str {
        &self.lock_key_name
    }

    pub fn partition(&self) -> Option<Partition> {
        self.partition
    }

    pub fn expire(&self) -> Option<i64> {
        self.expire
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    pub fn encoder_kind(&self) -> EncoderKind {
        self.encoder
            .as_ref()
            .map(|encoder| encoder.kind())
            .unwrap_or(EncoderKind::Disabled)
    }
}
