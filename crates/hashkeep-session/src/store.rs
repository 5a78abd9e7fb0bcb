//! Remote store abstraction.
//!
//! [`SessionStore`] is the subset of a networked hash-map service the
//! provider relies on: hash records addressed by string keys, with per-key
//! TTL and prefix listing. `hashkeep-redis` implements it over Redis;
//! [`MemoryStore`] implements it in-process for embedding and tests.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Operations the provider needs from the remote store.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single store is shared by the
/// provider, every session it hands out and the sweeper task.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Check connectivity.
    async fn ping(&self) -> Result<()>;

    /// Set one field of the record at `key`, creating the record if needed.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Read one field. Returns `Ok(None)` if the record or field is missing.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Read every field of the record. A missing record yields an empty map.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Set several fields at once.
    async fn hset_multiple(&self, key: &str, fields: &[(String, String)]) -> Result<()>;

    /// Delete the named fields.
    async fn hdel(&self, key: &str, fields: &[String]) -> Result<()>;

    /// Delete the whole record.
    async fn del(&self, key: &str) -> Result<()>;

    /// Check whether a record exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// List every key starting with `prefix`.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Expire the record `ttl` from now.
    ///
    /// Returns `Ok(false)` if there was no record to expire.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;
}

#[derive(Debug, Default)]
struct Record {
    fields: HashMap<String, String>,
    deadline: Option<Instant>,
}

impl Record {
    fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }
}

#[derive(Debug)]
struct MemoryInner {
    records: HashMap<String, Record>,
    available: bool,
}

/// In-process [`SessionStore`] with TTL support.
///
/// Expired records are treated as absent and pruned lazily, when their key
/// is next touched or listed. The store can be switched unavailable to
/// exercise degraded paths, and records can be removed out-of-band to
/// simulate external expiry.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                records: HashMap::new(),
                available: true,
            }),
        }
    }

    /// Make every subsequent call succeed (`true`) or fail (`false`).
    pub fn set_available(&self, available: bool) {
        self.inner.lock().available = available;
    }

    /// Drop a record without going through the provider.
    pub fn remove(&self, key: &str) -> bool {
        self.inner.lock().records.remove(key).is_some()
    }

    /// Remaining lifetime of a record, if it exists and has a deadline.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .records
            .get(key)
            .filter(|r| !r.is_expired(now))
            .and_then(|r| r.deadline)
            .map(|d| d.saturating_duration_since(now))
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .lock()
            .records
            .values()
            .filter(|r| !r.is_expired(now))
            .count()
    }

    /// Check if the store holds no live records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` against the record map, failing if unavailable.
    fn with_records<R>(&self, f: impl FnOnce(&mut HashMap<String, Record>) -> R) -> Result<R> {
        let mut inner = self.inner.lock();
        if !inner.available {
            return Err(Error::Store("memory store unavailable".into()));
        }
        Ok(f(&mut inner.records))
    }

    /// Like [`Self::with_records`], with `key` pruned first if expired.
    fn with_key<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, Record>) -> R,
    ) -> Result<R> {
        self.with_records(|records| {
            if records
                .get(key)
                .is_some_and(|r| r.is_expired(Instant::now()))
            {
                records.remove(key);
            }
            f(records)
        })
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.with_records(|_| ())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.with_key(key, |records| {
            records
                .entry(key.to_string())
                .or_default()
                .fields
                .insert(field.to_string(), value.to_string());
        })
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.with_key(key, |records| records.get(key).and_then(|r| r.fields.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.with_key(key, |records| {
            records
                .get(key)
                .map(|r| r.fields.clone())
                .unwrap_or_default()
        })
    }

    async fn hset_multiple(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        self.with_key(key, |records| {
            let record = records.entry(key.to_string()).or_default();
            for (name, value) in fields {
                record.fields.insert(name.clone(), value.clone());
            }
        })
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<()> {
        self.with_key(key, |records| {
            if let Some(record) = records.get_mut(key) {
                for name in fields {
                    record.fields.remove(name);
                }
                // A hash with no fields does not exist.
                if record.fields.is_empty() {
                    records.remove(key);
                }
            }
        })
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.with_key(key, |records| {
            records.remove(key);
        })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.with_key(key, |records| records.contains_key(key))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.with_records(|records| {
            let now = Instant::now();
            records.retain(|k, r| !(k.starts_with(prefix) && r.is_expired(now)));
            records
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect()
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.with_key(key, |records| match records.get_mut(key) {
            Some(record) => {
                // Too far out to represent means it never expires.
                record.deadline = Instant::now().checked_add(ttl);
                true
            }
            None => false,
        })
    }
}
