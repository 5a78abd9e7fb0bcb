//! Session registry backed by a remote hash store.
//!
//! This crate keeps per-client session state in a remote key-value store
//! and tracks which sessions exist in a local registry:
//! - Field reads and writes go straight to the store
//! - A background sweeper evicts sessions whose record expired or was
//!   deleted out-of-band
//! - A fresh process recovers its registry from the store on startup
//! - Lifecycle notifications go to an optional listener
//!
//! # Example
//!
//! ```rust,ignore
//! use hashkeep_session::{MemoryStore, ProviderConfig, SessionConfig, SessionProvider};
//!
//! let provider = Arc::new(
//!     SessionProvider::new(Arc::new(MemoryStore::new()), ProviderConfig::default()).await?,
//! );
//! provider.start_sweeper(None);
//!
//! let session = provider.new_session(&SessionConfig::default(), None).await?;
//! session.set("user", "alice").await;
//! ```

mod config;
mod error;
mod events;
mod id;
mod provider;
mod session;
mod sink;
mod store;
mod sweeper;

pub use config::{
    DEFAULT_COOKIE_NAME, DEFAULT_KEY_PREFIX, DEFAULT_NOTIFY_CAPACITY, DEFAULT_SWEEP_INTERVAL,
    DEFAULT_VALID, ProviderConfig, SessionConfig,
};
pub use error::{Error, Result};
pub use events::{EventDispatcher, SessionEvent, SessionListener, SharedListener};
pub use id::generate_session_id;
pub use provider::SessionProvider;
pub use session::{SESSION_ID_FIELD, Session};
pub use sink::{ErrorSink, MemorySink, Report, TracingSink};
pub use store::{MemoryStore, SessionStore};
pub use sweeper::{SweepReport, SweeperHandle};
