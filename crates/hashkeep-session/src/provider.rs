//! Session registry backed by a remote store.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::config::{ProviderConfig, SessionConfig};
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, SessionEvent, SharedListener, notify_created};
use crate::id::generate_session_id;
use crate::session::{SESSION_ID_FIELD, Session};
use crate::sink::{ErrorSink, TracingSink};
use crate::store::SessionStore;
use crate::sweeper::SweepReport;

/// Registry of sessions known to this process.
///
/// The store is the source of truth; the local map is a cache of which
/// sessions exist, always a subset of the store's records up to one sweep
/// interval of lag.
///
/// Structural changes (`new_session`, `del`, `clear`, `sync`, `sweep`) are
/// serialized by one async lock which is held across their store calls.
/// Lookups only take a short read lock on the map, and field I/O on a
/// [`Session`] does not touch the registry at all.
pub struct SessionProvider {
    store: Arc<dyn SessionStore>,
    config: ProviderConfig,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    structure: Mutex<()>,
    dispatcher: EventDispatcher,
    sink: Arc<dyn ErrorSink>,
}

impl SessionProvider {
    /// Create a provider that reports store errors through `tracing`.
    ///
    /// Must be called inside a tokio runtime. See [`Self::with_error_sink`].
    pub async fn new(store: Arc<dyn SessionStore>, config: ProviderConfig) -> Result<Self> {
        Self::with_error_sink(store, config, Arc::new(TracingSink)).await
    }

    /// Create a provider with a custom error sink.
    ///
    /// Pings the store (a failure is reported, not returned) and then
    /// rebuilds the local map from the records already under the prefix.
    pub async fn with_error_sink(
        store: Arc<dyn SessionStore>,
        config: ProviderConfig,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<Self> {
        config.validate()?;

        let provider = Self {
            dispatcher: EventDispatcher::spawn(config.notify_capacity, Arc::clone(&sink)),
            store,
            config,
            sessions: RwLock::new(HashMap::new()),
            structure: Mutex::new(()),
            sink,
        };

        if let Err(e) = provider.store.ping().await {
            provider.sink.report("ping", &e);
        }
        provider.sync().await;

        Ok(provider)
    }

    /// The provider configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Prefix applied to every store key.
    pub fn key_prefix(&self) -> &str {
        &self.config.key_prefix
    }

    /// Store key for a session id.
    pub fn remote_key(&self, id: &str) -> String {
        format!("{}{}", self.config.key_prefix, id)
    }

    /// Name of the cookie carrying the session id.
    pub fn cookie_name(&self) -> &str {
        &self.config.cookie_name
    }

    /// Extract the session id from an HTTP `Cookie` header value.
    pub fn session_id_from_cookie_header(&self, header: &str) -> Option<String> {
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| name.trim() == self.config.cookie_name)
            .map(|(_, value)| value.trim().trim_matches('"').to_string())
            .filter(|value| !value.is_empty())
    }

    /// Create a session with a fresh id and register it.
    ///
    /// Writes the reserved id field and the expiry to the store. If the
    /// expiry cannot be set the record is deleted again so no record is
    /// left without a TTL. The listener's `created` callback has run by
    /// the time this returns.
    pub async fn new_session(
        &self,
        config: &SessionConfig,
        listener: Option<&SharedListener>,
    ) -> Result<Arc<Session>> {
        let session = {
            let _guard = self.structure.lock().await;

            let id = generate_session_id();
            let key = self.remote_key(&id);

            if let Err(e) = self.store.hset(&key, SESSION_ID_FIELD, &id).await {
                self.sink.report("new_session", &e);
                return Err(e);
            }

            let expired = match self.store.expire(&key, config.valid).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(Error::Store(format!("record {key} vanished before expiry"))),
                Err(e) => Err(e),
            };
            if let Err(e) = expired {
                self.sink.report("new_session", &e);
                if let Err(rollback) = self.store.del(&key).await {
                    self.sink.report("new_session rollback", &rollback);
                }
                return Err(e);
            }

            let session = Arc::new(Session::new(
                id.clone(),
                key,
                Arc::clone(&self.store),
                Arc::clone(&self.sink),
            ));
            self.sessions.write().insert(id, Arc::clone(&session));
            session
        };

        debug!(
            session_id = %session.id(),
            valid_secs = config.valid.as_secs(),
            "Session created"
        );
        notify_created(&session, listener).await;
        Ok(session)
    }

    /// Extend a session's lifetime.
    ///
    /// `refreshed` is queued only if the store applied the new expiry. This
    /// waits for queue space if the notification worker is behind.
    pub async fn refresh(
        &self,
        session: &Arc<Session>,
        config: &SessionConfig,
        listener: Option<&SharedListener>,
    ) {
        if session.renew(config.valid).await {
            self.dispatcher
                .dispatch(SessionEvent::Refreshed, session, listener)
                .await;
        }
    }

    /// Look up a session locally. Invalidated sessions are still returned.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Whether a session is known locally and not invalidated.
    pub fn exists(&self, id: &str) -> bool {
        self.get(id).is_some_and(|s| !s.invalidated())
    }

    /// Snapshot of the local map.
    pub fn get_all(&self) -> HashMap<String, Arc<Session>> {
        self.sessions.read().clone()
    }

    /// Number of sessions known locally.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Check if no sessions are known locally.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Delete a session's record and forget it locally.
    ///
    /// The local entry is removed even if the store delete fails.
    pub async fn del(&self, id: &str) {
        let _guard = self.structure.lock().await;
        self.remove(id).await;
    }

    /// Delete every locally known session.
    pub async fn clear(&self) {
        let _guard = self.structure.lock().await;
        let ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        let count = ids.len();
        for id in ids {
            self.remove(&id).await;
        }
        debug!(count = count, "Cleared sessions");
    }

    /// Caller must hold the structure lock.
    async fn remove(&self, id: &str) {
        let key = self
            .get(id)
            .map(|session| session.key().to_string())
            .unwrap_or_else(|| self.remote_key(id));
        if let Err(e) = self.store.del(&key).await {
            self.sink.report("del", &e);
        }
        self.sessions.write().remove(id);
        trace!(session_id = %id, "Session deleted");
    }

    /// Rebuild the local map from the records under the key prefix.
    ///
    /// Each record's id comes from its reserved id field. Records that fail
    /// to read or lack the field are reported and skipped. Sessions already
    /// known keep their existing object. Returns the number of records
    /// recovered.
    pub async fn sync(&self) -> usize {
        let _guard = self.structure.lock().await;

        let keys = match self.store.keys(&self.config.key_prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                self.sink.report("sync", &e);
                return 0;
            }
        };

        let mut recovered = 0;
        for key in keys {
            let id = match self.store.hget(&key, SESSION_ID_FIELD).await {
                Ok(Some(id)) if !id.is_empty() => id,
                Ok(_) => {
                    self.sink.report(
                        "sync",
                        &Error::Store(format!("record {key} has no {SESSION_ID_FIELD} field")),
                    );
                    continue;
                }
                Err(e) => {
                    self.sink.report("sync", &e);
                    continue;
                }
            };

            trace!(session_id = %id, key = %key, "Session recovered from store");
            self.sessions.write().entry(id.clone()).or_insert_with(|| {
                Arc::new(Session::new(
                    id,
                    key,
                    Arc::clone(&self.store),
                    Arc::clone(&self.sink),
                ))
            });
            recovered += 1;
        }

        debug!(count = recovered, "Synced sessions from store");
        recovered
    }

    /// Run one reconciliation pass.
    ///
    /// Sessions whose record is gone are invalidated (queuing
    /// `invalidated`); then every invalidated session is dropped from the
    /// local map (queuing `destroyed`). A failed existence check skips the
    /// session for this pass.
    ///
    /// Notifications are queued after the structural lock is released, and
    /// every one is queued even when the sweep outruns the worker.
    pub async fn sweep(&self, listener: Option<&SharedListener>) -> SweepReport {
        let (report, events) = self.reconcile().await;
        for (event, session) in &events {
            self.dispatcher.dispatch(*event, session, listener).await;
        }
        report
    }

    async fn reconcile(&self) -> (SweepReport, Vec<(SessionEvent, Arc<Session>)>) {
        let _guard = self.structure.lock().await;
        let mut report = SweepReport::default();
        let mut events = Vec::new();

        let snapshot: Vec<(String, Arc<Session>)> = self
            .sessions
            .read()
            .iter()
            .map(|(id, session)| (id.clone(), Arc::clone(session)))
            .collect();

        for (id, session) in snapshot {
            report.checked += 1;

            match self.store.exists(session.key()).await {
                Ok(true) => {}
                Ok(false) => {
                    session.invalidate();
                    report.invalidated += 1;
                    events.push((SessionEvent::Invalidated, Arc::clone(&session)));
                }
                Err(e) => {
                    self.sink.report("sweep", &e);
                    report.skipped += 1;
                }
            }

            if session.invalidated() {
                self.sessions.write().remove(&id);
                report.destroyed += 1;
                events.push((SessionEvent::Destroyed, session));
            }
        }

        if report.destroyed > 0 || report.skipped > 0 {
            debug!(
                checked = report.checked,
                invalidated = report.invalidated,
                destroyed = report.destroyed,
                skipped = report.skipped,
                "Swept sessions"
            );
        }

        (report, events)
    }
}
