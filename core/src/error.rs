//! Error types for every operation that talks to something remote.
//!
//! Transport and inventory errors are recovered close to where they happen; only
//! [`CycleError`] ever reaches the caller of a whole discovery cycle.

use crate::inventory::ObjectKind;

/// Shell or HTTP transport failure. Degrades a host to "unreachable" or a probe
/// candidate to "not detected".
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot resolve {0}")]
    Resolve(String),
    #[error("connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },
    #[error("authentication as {user} was rejected")]
    Auth { user: String },
    #[error("remote command failed: {0}")]
    Exec(String),
    #[error("http request failed: {0}")]
    Http(String),
    #[error("blocking task aborted: {0}")]
    Task(String),
}

impl From<ssh2::Error> for TransportError {
    fn from(err: ssh2::Error) -> Self {
        TransportError::Exec(err.to_string())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Http(err.to_string())
    }
}

/// A failed call against the inventory API.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("request to {path} failed: {reason}")]
    Request { path: String, reason: String },
    #[error("{path} answered HTTP {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },
    #[error("unexpected response from {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("{kind} #{id} does not exist")]
    Missing { kind: ObjectKind, id: u64 },
    #[error("{kind} rejected the write: {reason}")]
    Rejected { kind: ObjectKind, reason: String },
}

/// A reconciliation step that could not complete for one record.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error("cluster {name} is unavailable: neither found nor created")]
    ClusterUnavailable { name: String },
}

/// Aborts a whole cycle. The next scheduled cycle starts over.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("no SSH credentials configured for host {0}")]
    MissingCredentials(String),
    #[error("inventory is unavailable: {0}")]
    InventoryUnavailable(#[source] InventoryError),
}
