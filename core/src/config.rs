use crate::errors::{SessionError, SessionResult};
use crate::expiry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `SESSIONKIT_SESSION_NAME`
pub const ENV_PREFIX: &str = "SESSIONKIT";

/// Where a backend client should connect
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ConnectionTarget {
    /// A connection string such as `redis://127.0.0.1:6379`
    Url(String),
    /// A structured `{scheme, host, port}` triple
    Parts {
        scheme: String,
        host: String,
        port: u16,
    },
}

/// Client tuning options that accompany a connection target
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ClientOptions {
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout_ms: Option<u64>,
}

/// Backend options, either configured once or passed per call
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct StoreOptions {
    pub connection: Option<ConnectionTarget>,
    pub client: Option<ClientOptions>,
}

impl StoreOptions {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            connection: Some(ConnectionTarget::Url(url.into())),
            client: None,
        }
    }

    pub fn parts(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            connection: Some(ConnectionTarget::Parts {
                scheme: scheme.into(),
                host: host.into(),
                port,
            }),
            client: None,
        }
    }

    pub fn with_client(mut self, client: ClientOptions) -> Self {
        self.client = Some(client);
        self
    }
}

/// Configuration struct for a session
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SessionConfig {
    pub session_name: Option<String>,
    pub lock_key_name: Option<String>,
    /// Default partition (logical database for the redis store)
    pub partition: Option<u8>,
    /// Relative expiration offset in seconds
    pub expire: Option<i64>,
    /// Relative lock expiration offset in seconds
    pub lock_expire: Option<i64>,
    /// Backend name: "session" or "redis"
    pub store: Option<String>,
    /// Encoder name: "json" or "serialize"
    pub parser: Option<String>,
    /// Bag keys mirrored onto typed fields
    #[serde(default)]
    pub promoted_fields: Vec<String>,
    pub store_options: Option<StoreOptions>,
    /// TTL a relative-expiry backend falls back to
    pub default_ttl: Option<i64>,
}

impl SessionConfig {
    /// Reads a TOML file; a missing file yields the default config
    pub fn load_from_file(path: &Path) -> SessionResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(config_error("reading config file"))?;
        let config: Self = toml::from_str(&content).map_err(config_error("parsing config file"))?;
        Ok(config.normalized())
    }

    /// Loads configuration from an optional TOML file layered under
    /// `SESSIONKIT_*` environment variables (nested keys split on `__`).
    pub fn load(path: Option<&Path>) -> SessionResult<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            );
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error("loading layered config"))?;

        Ok(config.normalized())
    }

    /// Writes the config as TOML, creating parent directories as needed
    pub fn save_to_file(&self, path: &Path) -> SessionResult<()> {
        let content = toml::to_string(self).map_err(config_error("serializing config"))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(config_error("creating config directory"))?;
        }
        fs::write(path, content).map_err(config_error("writing config file"))
    }

    /// Merges this config with another config, preferring values from the other config if present
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            session_name: other
                .session_name
                .clone()
                .or_else(|| self.session_name.clone()),
            lock_key_name: other
                .lock_key_name
                .clone()
                .or_else(|| self.lock_key_name.clone()),
            partition: other.partition.or(self.partition),
            expire: other.expire.or(self.expire),
            lock_expire: other.lock_expire.or(self.lock_expire),
            store: other.store.clone().or_else(|| self.store.clone()),
            parser: other.parser.clone().or_else(|| self.parser.clone()),
            promoted_fields: if other.promoted_fields.is_empty() {
                self.promoted_fields.clone()
            } else {
                other.promoted_fields.clone()
            },
            store_options: other
                .store_options
                .clone()
                .or_else(|| self.store_options.clone()),
            default_ttl: other.default_ttl.or(self.default_ttl),
        }
    }

    /// Drops negative expiration offsets
    fn normalized(mut self) -> Self {
        self.expire = expiry::normalize(self.expire);
        self.lock_expire = expiry::normalize(self.lock_expire);
        self.default_ttl = expiry::normalize(self.default_ttl);
        self
    }
}

/// Maps any displayable failure into `ConfigError`, prefixed with what was
/// being attempted
fn config_error<E: std::fmt::Display>(action: &'static str) -> impl FnOnce(E) -> SessionError {
    move |e| SessionError::ConfigError(format!("Failed {}: {}", action, e))
}

/// `~/.config/<app_name>`
pub fn get_default_config_dir(app_name: &str) -> SessionResult<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".config").join(app_name))
        .ok_or_else(|| SessionError::ConfigError("Could not determine home directory".to_string()))
}

/// Default config file inside `get_default_config_dir`
pub fn get_default_config_file(app_name: &str) -> SessionResult<PathBuf> {
    Ok(get_default_config_dir(app_name)?.join("sessionkit.toml"))
}
