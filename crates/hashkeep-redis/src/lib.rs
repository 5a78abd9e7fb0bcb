//! Redis implementation of [`SessionStore`].
//!
//! Each session is a Redis hash under `prefix + id`; expiry uses `EXPIRE`
//! and resync lists keys with `KEYS prefix*`.
//!
//! ```rust,ignore
//! use hashkeep_redis::{RedisStore, RedisStoreConfig};
//! use hashkeep_session::{ProviderConfig, SessionProvider};
//!
//! let store = RedisStore::connect(&RedisStoreConfig::new("redis://127.0.0.1/")).await?;
//! let provider = SessionProvider::new(Arc::new(store), ProviderConfig::default()).await?;
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Deserialize;
use tracing::debug;

use hashkeep_session::{Error, Result, SessionStore};

/// Default Redis connection URL.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/";

/// Connection settings for [`RedisStore`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisStoreConfig {
    /// Redis connection URL (`redis://[:password@]host:port/db`).
    pub url: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
        }
    }
}

impl RedisStoreConfig {
    /// Create a config for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Parse a config from TOML.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ReadConfig {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }
}

/// Session store backed by a Redis server.
///
/// Cloning is cheap; clones share the underlying multiplexed connection,
/// which reconnects on its own after connection loss.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to the server named in `config`.
    pub async fn connect(config: &RedisStoreConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(Error::store)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(Error::store)?;
        debug!(url = %redact(&config.url), "Connected to Redis");
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Error::store)?;
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.hset(key, field, value).await.map_err(Error::store)?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        conn.hget(key, field).await.map_err(Error::store)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn();
        conn.hgetall(key).await.map_err(Error::store)
    }

    async fn hset_multiple(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let _: () = conn
            .hset_multiple(key, fields)
            .await
            .map_err(Error::store)?;
        Ok(())
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let _: () = conn
            .hdel(key, fields.to_vec())
            .await
            .map_err(Error::store)?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.del(key).await.map_err(Error::store)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn();
        conn.exists(key).await.map_err(Error::store)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        conn.keys(key_pattern(prefix)).await.map_err(Error::store)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn();
        conn.expire(key, expire_seconds(ttl))
            .await
            .map_err(Error::store)
    }
}

/// `KEYS` pattern matching every key that starts with `prefix` literally.
fn key_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

/// Whole seconds for `EXPIRE`, rounded up, at least one.
fn expire_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis().div_ceil(1000))
        .unwrap_or(i64::MAX)
        .max(1)
}

/// Hide the password in a connection URL for logging.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_pattern_escapes_glob() {
        assert_eq!(key_pattern("session:"), "session:*");
        assert_eq!(key_pattern("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\*");
    }

    #[test]
    fn test_expire_seconds_rounds_up() {
        assert_eq!(expire_seconds(Duration::from_secs(60)), 60);
        assert_eq!(expire_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(expire_seconds(Duration::from_millis(1)), 1);
        assert_eq!(expire_seconds(Duration::ZERO), 1);
    }

    #[test]
    fn test_redact() {
        assert_eq!(
            redact("redis://:secret@localhost:6379/0"),
            "redis://***@localhost:6379/0"
        );
        assert_eq!(redact("redis://localhost/"), "redis://localhost/");
    }

    #[test]
    fn test_config() {
        assert_eq!(RedisStoreConfig::default().url, DEFAULT_REDIS_URL);
        let config = RedisStoreConfig::from_toml("url = \"redis://cache:6380/2\"").unwrap();
        assert_eq!(config.url, "redis://cache:6380/2");
        assert!(matches!(
            RedisStoreConfig::from_toml("url = 5"),
            Err(Error::ParseConfig(_))
        ));
    }
}
