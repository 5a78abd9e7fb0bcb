//! Remote-backed session object.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::trace;

use crate::error::Error;
use crate::sink::ErrorSink;
use crate::store::SessionStore;

/// Reserved field holding the session's own id inside its store record.
///
/// Written by the provider on creation and read back on resync. Callers can
/// read it but every write, delete or clear skips it.
pub const SESSION_ID_FIELD: &str = "session_id";

/// One session: an id, its store key and a local invalidation flag.
///
/// Field values live only in the store; every accessor goes to the store.
/// Store failures are reported to the provider's [`ErrorSink`] and surface
/// to the caller as absent values or empty maps.
pub struct Session {
    id: String,
    key: String,
    invalidated: AtomicBool,
    store: Arc<dyn SessionStore>,
    sink: Arc<dyn ErrorSink>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("invalidated", &self.invalidated())
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        id: impl Into<String>,
        key: impl Into<String>,
        store: Arc<dyn SessionStore>,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            invalidated: AtomicBool::new(false),
            store,
            sink,
        }
    }

    /// The session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The store key backing this session.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Reset the record's expiry to `ttl` from now.
    ///
    /// Returns `true` if the store applied the new expiry. Failures are
    /// reported to the sink; a record that no longer exists counts as a
    /// failure.
    pub async fn renew(&self, ttl: Duration) -> bool {
        match self.store.expire(&self.key, ttl).await {
            Ok(true) => {
                trace!(session_id = %self.id, ttl_secs = ttl.as_secs(), "Session renewed");
                true
            }
            Ok(false) => {
                self.sink.report(
                    "renew",
                    &Error::Store(format!("no record for key {}", self.key)),
                );
                false
            }
            Err(e) => {
                self.sink.report("renew", &e);
                false
            }
        }
    }

    /// Whether the session has been marked dead.
    pub fn invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }

    /// Mark the session dead. There is no way back.
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::Release);
    }

    /// Read one field.
    ///
    /// A missing field and a field stored as the empty string both come
    /// back as `None`.
    pub async fn get(&self, name: &str) -> Option<String> {
        match self.store.hget(&self.key, name).await {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                self.sink.report("get", &e);
                None
            }
        }
    }

    /// Snapshot of every field, the reserved id field included.
    pub async fn get_all(&self) -> HashMap<String, String> {
        match self.store.hgetall(&self.key).await {
            Ok(values) => values,
            Err(e) => {
                self.sink.report("get_all", &e);
                HashMap::new()
            }
        }
    }

    /// Write one field. Writes to the reserved id field are ignored.
    pub async fn set(&self, name: &str, value: impl Into<String>) {
        if is_reserved(name) {
            return;
        }
        let value = value.into();
        if let Err(e) = self.store.hset(&self.key, name, &value).await {
            self.sink.report("set", &e);
        }
    }

    /// Write many fields, optionally clearing existing ones first.
    ///
    /// The reserved id field is dropped from `fields` if present.
    pub async fn set_all(&self, fields: HashMap<String, String>, flush: bool) {
        if flush {
            self.clear().await;
        }
        let fields: Vec<(String, String)> = fields
            .into_iter()
            .filter(|(name, _)| !is_reserved(name))
            .collect();
        if fields.is_empty() {
            return;
        }
        if let Err(e) = self.store.hset_multiple(&self.key, &fields).await {
            self.sink.report("set_all", &e);
        }
    }

    /// Delete one field. The reserved id field cannot be deleted.
    pub async fn del(&self, name: &str) {
        if is_reserved(name) {
            return;
        }
        if let Err(e) = self.store.hdel(&self.key, &[name.to_string()]).await {
            self.sink.report("del", &e);
        }
    }

    /// Delete every field except the reserved id field.
    pub async fn clear(&self) {
        let names: Vec<String> = self
            .get_all()
            .await
            .into_keys()
            .filter(|name| !is_reserved(name))
            .collect();
        if names.is_empty() {
            return;
        }
        if let Err(e) = self.store.hdel(&self.key, &names).await {
            self.sink.report("clear", &e);
        }
    }
}

fn is_reserved(name: &str) -> bool {
    name == SESSION_ID_FIELD
}
