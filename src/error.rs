//! Error taxonomy of the fleet manager
//!
//! Background cycles turn these into `ErrorUpdate` messages; caller-invoked
//! operations return them directly.

use crate::kube::ClientError;
use crate::models::FluxResourceKind;

/// Errors surfaced by the fleet manager
#[derive(Debug, Clone, thiserror::Error)]
pub enum ManagerError {
    #[error("failed to connect to cluster {cluster}: {source}")]
    Connection {
        cluster: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to list {what} in cluster {cluster}: {source}")]
    List {
        cluster: String,
        what: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to get {kind} {namespace}/{name} in cluster {cluster}: {source}")]
    Get {
        cluster: String,
        kind: FluxResourceKind,
        namespace: String,
        name: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to update {kind} {namespace}/{name} in cluster {cluster}: {source}")]
    Update {
        cluster: String,
        kind: FluxResourceKind,
        namespace: String,
        name: String,
        #[source]
        source: ClientError,
    },

    #[error("{kind} {namespace}/{name} was modified concurrently in cluster {cluster}")]
    UpdateConflict {
        cluster: String,
        kind: FluxResourceKind,
        namespace: String,
        name: String,
    },

    #[error("{kind} {namespace}/{name} not found in cluster {cluster}")]
    NotFound {
        cluster: String,
        kind: FluxResourceKind,
        namespace: String,
        name: String,
    },

    #[error("cluster {0} not found")]
    ClusterNotFound(String),

    #[error("cluster {0} is not connected")]
    ClusterNotConnected(String),

    #[error("no cluster selected")]
    NoClusterSelected,

    #[error("unsupported resource kind: {0}")]
    UnsupportedKind(String),

    #[error("operation cancelled: manager is shutting down")]
    Cancelled,
}

/// Result type for fleet manager operations
pub type ManagerResult<T> = Result<T, ManagerError>;

impl ManagerError {
    /// Cluster the error is about, if any
    pub fn cluster(&self) -> Option<&str> {
        match self {
            ManagerError::Connection { cluster, .. }
            | ManagerError::List { cluster, .. }
            | ManagerError::Get { cluster, .. }
            | ManagerError::Update { cluster, .. }
            | ManagerError::UpdateConflict { cluster, .. }
            | ManagerError::NotFound { cluster, .. } => Some(cluster),
            ManagerError::ClusterNotFound(cluster) | ManagerError::ClusterNotConnected(cluster) => {
                Some(cluster)
            }
            ManagerError::NoClusterSelected
            | ManagerError::UnsupportedKind(_)
            | ManagerError::Cancelled => None,
        }
    }

    /// Whether the underlying cluster call ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ManagerError::Connection { source: ClientError::Timeout(_), .. }
                | ManagerError::List { source: ClientError::Timeout(_), .. }
                | ManagerError::Get { source: ClientError::Timeout(_), .. }
                | ManagerError::Update { source: ClientError::Timeout(_), .. }
        )
    }
}
