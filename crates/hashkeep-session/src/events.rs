//! Session lifecycle notifications.
//!
//! A [`SessionListener`] is told when a session is created, refreshed,
//! invalidated or destroyed. `created` runs inline before
//! [`SessionProvider::new_session`](crate::SessionProvider::new_session)
//! returns. The other three go through the [`EventDispatcher`], a bounded
//! queue drained by one worker task, so the caller never waits on a
//! listener, only on queue space when the worker falls behind.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::Error;
use crate::session::Session;
use crate::sink::ErrorSink;

/// Callbacks for session lifecycle transitions.
///
/// Every method defaults to a no-op; implement only what you need.
#[async_trait]
pub trait SessionListener: Send + Sync {
    /// A session was created. Runs before the creator gets the session.
    async fn created(&self, _session: &Arc<Session>) {}

    /// A session's lifetime was extended.
    async fn refreshed(&self, _session: &Arc<Session>) {}

    /// A session's store record was found missing.
    async fn invalidated(&self, _session: &Arc<Session>) {}

    /// A session was dropped from the local registry.
    async fn destroyed(&self, _session: &Arc<Session>) {}
}

/// Shared handle to a listener.
pub type SharedListener = Arc<dyn SessionListener>;

/// Lifecycle transitions delivered asynchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// See [`SessionListener::refreshed`].
    Refreshed,
    /// See [`SessionListener::invalidated`].
    Invalidated,
    /// See [`SessionListener::destroyed`].
    Destroyed,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Refreshed => write!(f, "refreshed"),
            SessionEvent::Invalidated => write!(f, "invalidated"),
            SessionEvent::Destroyed => write!(f, "destroyed"),
        }
    }
}

struct Notification {
    event: SessionEvent,
    session: Arc<Session>,
    listener: SharedListener,
}

impl Notification {
    async fn deliver(self) {
        trace!(session_id = %self.session.id(), event = %self.event, "Delivering notification");
        match self.event {
            SessionEvent::Refreshed => self.listener.refreshed(&self.session).await,
            SessionEvent::Invalidated => self.listener.invalidated(&self.session).await,
            SessionEvent::Destroyed => self.listener.destroyed(&self.session).await,
        }
    }
}

/// Bounded fire-and-forget notification queue.
///
/// Notifications are delivered one at a time in the order they were
/// queued. When the queue is full, [`dispatch`](Self::dispatch) waits for
/// space instead of dropping the notification.
pub struct EventDispatcher {
    tx: mpsc::Sender<Notification>,
    worker: JoinHandle<()>,
    sink: Arc<dyn ErrorSink>,
}

impl EventDispatcher {
    /// Start the delivery worker on the current tokio runtime.
    pub fn spawn(capacity: usize, sink: Arc<dyn ErrorSink>) -> Self {
        let (tx, mut rx) = mpsc::channel::<Notification>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                notification.deliver().await;
            }
        });
        Self { tx, worker, sink }
    }

    /// Queue `event` for `session`. No-op without a listener.
    ///
    /// Returns once the notification is queued, not delivered. Must not be
    /// awaited from inside a listener callback while the queue is full.
    pub async fn dispatch(
        &self,
        event: SessionEvent,
        session: &Arc<Session>,
        listener: Option<&SharedListener>,
    ) {
        let Some(listener) = listener else {
            return;
        };
        let notification = Notification {
            event,
            session: Arc::clone(session),
            listener: Arc::clone(listener),
        };
        if self.tx.send(notification).await.is_err() {
            self.sink.report(
                "dispatch",
                &Error::Store(format!(
                    "dropped {} notification for session {}: dispatcher stopped",
                    event,
                    session.id()
                )),
            );
        }
    }

    /// Notifications currently waiting for delivery.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

/// Run the `created` callback inline.
pub(crate) async fn notify_created(session: &Arc<Session>, listener: Option<&SharedListener>) {
    if let Some(listener) = listener {
        listener.created(session).await;
    }
}
