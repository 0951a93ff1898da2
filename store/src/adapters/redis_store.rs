use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use redis::{Client, Connection, IntoConnectionInfo, RedisResult, ToRedisArgs};
use sessionkit_core::expiry::{self, Ttl};
use sessionkit_core::{ClientOptions, ClockRef, ConnectionTarget, Payload, StoreOptions, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::{Partition, SessionStore};

/// Highest logical database index accepted as a partition
pub const MAX_DATABASE: Partition = 15;

/// TTL given to a lock when the caller supplies no usable expiry
pub const DEFAULT_LOCK_TTL: i64 = 30;

/// Deletes the lock key only if it still holds our token
const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// A connection string plus the client block that goes with it
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConnection {
    pub url: String,
    pub client: Option<ClientOptions>,
}

/// Turn backend options into a connection string.
///
/// A URL must be non-blank; a `{scheme, host, port}` triple must have all three
/// parts non-empty. Anything else resolves to `None`.
pub fn handle_option(options: &StoreOptions) -> Option<ResolvedConnection> {
    let url = match options.connection.as_ref()? {
        ConnectionTarget::Url(url) if !url.trim().is_empty() => url.trim().to_string(),
        ConnectionTarget::Parts { scheme, host, port }
            if !scheme.trim().is_empty() && !host.trim().is_empty() && *port != 0 =>
        {
            parts_url(scheme.trim(), host.trim(), *port)
        }
        _ => return None,
    };
    Some(ResolvedConnection {
        url,
        client: options.client.clone(),
    })
}

fn parts_url(scheme: &str, host: &str, port: u16) -> String {
    match scheme.to_ascii_lowercase().as_str() {
        "tcp" | "redis" => format!("redis://{}:{}/", host, port),
        "tls" | "rediss" => format!("rediss://{}:{}/", host, port),
        "unix" => format!("redis+unix://{}", host),
        other => format!("{}://{}:{}/", other, host, port),
    }
}

/// Redis implementation of SessionStore.
///
/// Opens a new connection for every call so per-call options take effect.
/// Expiry is delegated to redis key TTLs.
#[derive(Debug)]
pub struct RedisStore {
    database: Partition,
    default_ttl: Option<i64>,
    connection: Option<ResolvedConnection>,
    clock: ClockRef,
    lock_tokens: Mutex<HashMap<(Partition, String), String>>,
}

impl RedisStore {
    pub fn new(
        partition: Option<Partition>,
        default_ttl: Option<i64>,
        options: Option<&StoreOptions>,
        clock: ClockRef,
    ) -> Self {
        let database = match partition {
            Some(p) if p <= MAX_DATABASE => p,
            _ => 0,
        };
        let connection = options.and_then(handle_option);
        if connection.is_none() {
            debug!("Redis store created without a default connection");
        }
        Self {
            database,
            default_ttl: expiry::normalize(default_ttl),
            connection,
            clock,
            lock_tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn database(&self) -> Partition {
        self.database
    }

    /// Resolve a partition, falling back to the instance default when it is
    /// missing or out of range
    pub fn resolve_database(&self, partition: Option<Partition>) -> Partition {
        match partition {
            Some(p) if p <= MAX_DATABASE => p,
            Some(p) => {
                debug!("Partition {} out of range, using database {}", p, self.database);
                self.database
            }
            None => self.database,
        }
    }

    /// Per-call options win when they resolve; otherwise the instance default is used
    pub fn resolve_connection(&self, options: Option<&StoreOptions>) -> Option<ResolvedConnection> {
        let per_call = options.and_then(handle_option).map(|mut resolved| {
            if resolved.client.is_none() {
                resolved.client = self.connection.as_ref().and_then(|c| c.client.clone());
            }
            resolved
        });
        per_call.or_else(|| self.connection.clone())
    }

    fn create_client(&self, database: Partition, options: Option<&StoreOptions>) -> Option<Connection> {
        let Some(resolved) = self.resolve_connection(options) else {
            warn!("No redis connection configured");
            return None;
        };

        let connect = || -> RedisResult<Connection> {
            let mut info = resolved.url.as_str().into_connection_info()?;
            info.redis.db = i64::from(database);
            let timeout = resolved.client.as_ref().and_then(|client| {
                if let Some(username) = &client.username {
                    info.redis.username = Some(username.clone());
                }
                if let Some(password) = &client.password {
                    info.redis.password = Some(password.clone());
                }
                client.connect_timeout_ms
            });
            let client = Client::open(info)?;
            match timeout {
                Some(ms) => client.get_connection_with_timeout(Duration::from_millis(ms)),
                None => client.get_connection(),
            }
        };

        match connect() {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!("Failed to connect to redis database {}: {}", database, e);
                None
            }
        }
    }

    fn with_connection<T>(
        &self,
        operation: &str,
        partition: Option<Partition>,
        options: Option<&StoreOptions>,
        op: impl FnOnce(&mut Connection) -> RedisResult<T>,
    ) -> Option<T> {
        let database = self.resolve_database(partition);
        let mut conn = self.create_client(database, options)?;
        match op(&mut conn) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Redis {} failed: {}", operation, e);
                None
            }
        }
    }

    /// Wire bytes and TTL for a write, or `None` when the write must be
    /// skipped because its expiry is already spent
    fn prepare_write(
        &self,
        name: &str,
        payload: Payload,
        expire_at: Option<i64>,
    ) -> Option<(Vec<u8>, Ttl)> {
        let Some(ttl) = expiry::ttl_from_absolute(expire_at, self.clock.now(), self.default_ttl)
        else {
            warn!("Refusing to store session {}: expiry {:?} has already passed", name, expire_at);
            return None;
        };
        Some((to_wire(payload)?, ttl))
    }

    fn tokens(&self) -> Option<std::sync::MutexGuard<'_, HashMap<(Partition, String), String>>> {
        self.lock_tokens
            .lock()
            .map_err(|e| warn!("Failed to acquire lock token map: {}", e))
            .ok()
    }
}

fn to_wire(payload: Payload) -> Option<Vec<u8>> {
    match payload {
        Payload::Text(text) => Some(text.into_bytes()),
        Payload::Bytes(bytes) => Some(bytes),
        Payload::Bag(bag) => {
            let json = serde_json::Value::from(&Value::Map(bag));
            serde_json::to_vec(&json)
                .map_err(|e| warn!("Failed to serialize raw session bag: {}", e))
                .ok()
        }
    }
}

/// Inverse of `to_wire`. A JSON object comes back as a bag, which every
/// encoder accepts as-is; anything else stays opaque bytes for the encoder.
///
/// A native payload is an encoded `Value` and never starts with `{`.
fn from_wire(bytes: Vec<u8>) -> Payload {
    if bytes.first() != Some(&b'{') {
        return Payload::Bytes(bytes);
    }
    match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(json @ serde_json::Value::Object(_)) => match Value::from(json) {
            Value::Map(bag) => Payload::Bag(bag),
            _ => Payload::Bytes(bytes),
        },
        _ => Payload::Bytes(bytes),
    }
}

fn set_command<V: ToRedisArgs>(key: &str, value: V, ttl: Ttl) -> redis::Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value);
    if let Ttl::Seconds(seconds) = ttl {
        cmd.arg("EX").arg(seconds);
    }
    cmd
}

impl SessionStore for RedisStore {
    fn has(&self, name: &str, partition: Option<Partition>, options: Option<&StoreOptions>) -> bool {
        self.with_connection("EXISTS", partition, options, |conn| {
            redis::cmd("EXISTS").arg(name).query::<bool>(conn)
        })
        .unwrap_or(false)
    }

    fn get_data(
        &self,
        name: &str,
        partition: Option<Partition>,
        options: Option<&StoreOptions>,
    ) -> Option<Payload> {
        self.with_connection("GET", partition, options, |conn| {
            redis::cmd("GET").arg(name).query::<Option<Vec<u8>>>(conn)
        })
        .flatten()
        .map(from_wire)
    }

    fn set_data(
        &self,
        name: &str,
        payload: Payload,
        partition: Option<Partition>,
        expire_at: Option<i64>,
        options: Option<&StoreOptions>,
    ) -> bool {
        let Some((value, ttl)) = self.prepare_write(name, payload, expire_at) else {
            return false;
        };
        debug!("Storing session {} with {:?}", name, ttl);
        self.with_connection("SET", partition, options, |conn| {
            set_command(name, value, ttl).query::<()>(conn)
        })
        .is_some()
    }

    fn set_expire(
        &self,
        name: &str,
        partition: Option<Partition>,
        expire_at: Option<i64>,
        options: Option<&StoreOptions>,
    ) -> bool {
        let now = self.clock.now();
        let target = expiry::clamp_new_expiry(expire_at, now);
        self.with_connection("set_expire", partition, options, |conn| {
            let exists = redis::cmd("EXISTS").arg(name).query::<bool>(conn)?;
            if target == expiry::NEVER {
                if exists {
                    redis::cmd("PERSIST").arg(name).query::<i64>(conn)?;
                } else {
                    set_command(name, "", Ttl::Persist).query::<()>(conn)?;
                }
            } else if target > now {
                if exists {
                    redis::cmd("EXPIREAT").arg(name).arg(target).query::<i64>(conn)?;
                } else {
                    let ttl = Ttl::Seconds((target - now) as u64);
                    set_command(name, "", ttl).query::<()>(conn)?;
                }
            } else if exists {
                // A timestamp in the past makes redis drop the key
                redis::cmd("EXPIREAT").arg(name).arg(target).query::<i64>(conn)?;
            }
            Ok(())
        })
        .is_some()
    }

    fn delete_data(
        &self,
        name: &str,
        partition: Option<Partition>,
        options: Option<&StoreOptions>,
    ) -> bool {
        self.with_connection("DEL", partition, options, |conn| {
            redis::cmd("DEL").arg(name).query::<i64>(conn)
        })
        .is_some()
    }

    fn lock(
        &self,
        lock_key: &str,
        partition: Option<Partition>,
        expire_at: Option<i64>,
        options: Option<&StoreOptions>,
    ) -> bool {
        let ttl = expiry::ttl_from_absolute(expire_at, self.clock.now(), Some(DEFAULT_LOCK_TTL))
            .unwrap_or(Ttl::Seconds(DEFAULT_LOCK_TTL as u64));
        let token = Uuid::new_v4().to_string();
        let acquired = self
            .with_connection("lock", partition, options, |conn| {
                let mut cmd = set_command(lock_key, token.as_str(), ttl);
                cmd.arg("NX");
                cmd.query::<Option<String>>(conn)
            })
            .flatten()
            .is_some();

        if acquired {
            let database = self.resolve_database(partition);
            if let Some(mut tokens) = self.tokens() {
                tokens.insert((database, lock_key.to_string()), token);
            }
            debug!("Acquired advisory lock {}", lock_key);
        } else {
            debug!("Advisory lock {} is held elsewhere", lock_key);
        }
        acquired
    }

    fn unlock(
        &self,
        lock_key: &str,
        partition: Option<Partition>,
        options: Option<&StoreOptions>,
    ) -> bool {
        let database = self.resolve_database(partition);
        let token = self
            .tokens()
            .and_then(|mut tokens| tokens.remove(&(database, lock_key.to_string())));
        let Some(token) = token else {
            debug!("Advisory lock {} is not held by this store", lock_key);
            return false;
        };

        let script = redis::Script::new(RELEASE_LOCK_SCRIPT);
        self.with_connection("unlock", partition, options, |conn| {
            script.key(lock_key).arg(&token).invoke::<i64>(conn)
        })
        .map(|deleted| deleted == 1)
        .unwrap_or(false)
    }
}
