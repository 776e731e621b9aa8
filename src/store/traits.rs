//! Store trait definitions

use crate::types::{Action, Instance, Topology};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur talking to the remote store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not connected: issue connect() first")]
    NotConnected,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("request error: {status} - {reason}")]
    Request { status: u16, reason: String },

    #[error("response error: {0}")]
    Response(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure reported by a non-HTTP backend (e.g. injected in tests)
    #[error("store rejected {operation}: {message}")]
    Rejected { operation: String, message: String },
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// The capabilities the loader needs from the remote store.
///
/// The loader issues calls strictly one at a time and awaits each before
/// continuing, so implementations need not order concurrent requests.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Acquire a session. Calling it again on an open session is a no-op.
    async fn connect(&self) -> StoreResult<()>;

    /// Release the session. Safe to call when not connected.
    async fn close(&self) -> StoreResult<()>;

    /// Create an action, returning it with its store identity.
    async fn create_action(&self, action: &Action) -> StoreResult<Action>;

    /// Create a topology, returning it with its store identity.
    async fn create_topology(&self, topology: &Topology) -> StoreResult<Topology>;

    /// Submit a batch of instances. All-or-nothing from the caller's view.
    async fn batch_create(&self, instances: &[Instance]) -> StoreResult<()>;

    /// Link a topology to an action. Both must carry identities.
    async fn link(&self, action: &Action, topology: &Topology) -> StoreResult<()>;
}
