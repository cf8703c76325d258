//! Named cluster connections and the active selection
//!
//! The map sits behind a reader/writer lock. Readers copy what they need and
//! release the lock before any cluster I/O; the write lock is only taken to
//! add or remove a connection.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::error::{ManagerError, ManagerResult};
use crate::kube::{ClientError, ClusterClient, ClusterConnector, ClusterTarget};

/// Upper bound for building a client plus its reachability check
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A live client for one cluster and the identity it was built from
#[derive(Clone)]
pub struct ClusterConnection {
    pub target: ClusterTarget,
    pub client: Arc<dyn ClusterClient>,
}

impl ClusterConnection {
    pub fn name(&self) -> &str {
        &self.target.name
    }
}

impl fmt::Debug for ClusterConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConnection")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct Selection {
    cluster: Option<String>,
    /// `None` means all namespaces
    namespace: Option<String>,
}

pub struct ConnectionRegistry {
    connector: Arc<dyn ClusterConnector>,
    connections: RwLock<HashMap<String, ClusterConnection>>,
    selection: RwLock<Selection>,
}

impl ConnectionRegistry {
    pub fn new(connector: Arc<dyn ClusterConnector>, namespace: Option<String>) -> Self {
        Self {
            connector,
            connections: RwLock::new(HashMap::new()),
            selection: RwLock::new(Selection {
                cluster: None,
                namespace,
            }),
        }
    }

    /// Build a client for `target`, check it is reachable, and store it under its name
    ///
    /// Replaces an existing connection of the same name. Nothing is stored
    /// when building or checking fails.
    pub async fn connect(&self, target: ClusterTarget) -> ManagerResult<ClusterConnection> {
        let name = target.name.clone();
        tracing::debug!("Connecting to cluster {} (context {:?})", name, target.context);

        let attempt = async {
            let client = self.connector.connect(&target).await?;
            client.test_connection(CONNECT_TIMEOUT).await?;
            Ok::<_, ClientError>(client)
        };
        let client = match tokio::time::timeout(CONNECT_TIMEOUT, attempt).await {
            Ok(Ok(client)) => client,
            Ok(Err(source)) => return Err(ManagerError::Connection { cluster: name, source }),
            Err(_) => {
                return Err(ManagerError::Connection {
                    cluster: name,
                    source: ClientError::Timeout(CONNECT_TIMEOUT),
                });
            }
        };

        let connection = ClusterConnection { target, client };
        if self.insert(connection.clone()).is_some() {
            tracing::info!("Replaced connection to cluster {}", name);
        } else {
            tracing::info!("Connected to cluster {}", name);
        }
        Ok(connection)
    }

    /// Store a ready connection, returning the one it replaced
    pub fn insert(&self, connection: ClusterConnection) -> Option<ClusterConnection> {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(connection.name().to_string(), connection)
    }

    pub fn remove(&self, name: &str) -> Option<ClusterConnection> {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn get(&self, name: &str) -> Option<ClusterConnection> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Copy of every connection, ordered by name
    pub fn snapshot(&self) -> Vec<ClusterConnection> {
        let mut connections: Vec<_> = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        connections.sort_by(|a, b| a.name().cmp(b.name()));
        connections
    }

    pub fn list_names(&self) -> BTreeSet<String> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn set_current(&self, name: &str) -> ManagerResult<()> {
        if !self.contains(name) {
            return Err(ManagerError::ClusterNotFound(name.to_string()));
        }
        self.selection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .cluster = Some(name.to_string());
        tracing::debug!("Current cluster set to {}", name);
        Ok(())
    }

    pub fn current(&self) -> Option<String> {
        self.selection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cluster
            .clone()
    }

    /// Connection of the selected cluster
    pub fn current_connection(&self) -> ManagerResult<ClusterConnection> {
        let current = self.current().ok_or(ManagerError::NoClusterSelected)?;
        self.get(&current)
            .ok_or(ManagerError::ClusterNotConnected(current))
    }

    pub fn set_namespace(&self, namespace: Option<String>) {
        self.selection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .namespace = namespace;
    }

    pub fn namespace(&self) -> Option<String> {
        self.selection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .namespace
            .clone()
    }
}
