//! Suspend, resume and reconcile against the selected cluster
//!
//! Every operation is one get-modify-update sequence under a shared deadline.
//! A conflicting write is returned to the caller, never retried.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde_json::Value;
use tokio::time::Instant;

use super::connection_registry::{ClusterConnection, ConnectionRegistry};
use super::refresh_engine::list_normalized;
use super::shutdown::Shutdown;
use super::update_bus::{ResourceUpdate, UpdateBus};
use crate::config::defaults::DEFAULT_NAMESPACE;
use crate::error::{ManagerError, ManagerResult};
use crate::kube::ClientError;
use crate::models::FluxResourceKind;

/// Deadline for a whole get-modify-update sequence
pub const MUTATION_TIMEOUT: Duration = Duration::from_secs(10);

pub struct MutationService {
    registry: Arc<ConnectionRegistry>,
    bus: Arc<UpdateBus>,
    shutdown: Shutdown,
    last_reconcile: Mutex<Option<DateTime<Utc>>>,
}

impl MutationService {
    pub fn new(registry: Arc<ConnectionRegistry>, bus: Arc<UpdateBus>, shutdown: Shutdown) -> Self {
        Self {
            registry,
            bus,
            shutdown,
            last_reconcile: Mutex::new(None),
        }
    }

    pub async fn suspend(&self, kind: FluxResourceKind, name: &str) -> ManagerResult<()> {
        self.mutate(kind, name, "suspended", |obj| kind.set_suspended(obj, true))
            .await
    }

    pub async fn resume(&self, kind: FluxResourceKind, name: &str) -> ManagerResult<()> {
        self.mutate(kind, name, "resumed", |obj| kind.set_suspended(obj, false))
            .await
    }

    /// Stamp the reconcile-request annotation with the current time
    pub async fn reconcile(&self, kind: FluxResourceKind, name: &str) -> ManagerResult<()> {
        let requested_at = self
            .next_reconcile_time()
            .to_rfc3339_opts(SecondsFormat::Nanos, true);
        self.mutate(kind, name, "annotated for reconciliation", |obj| {
            kind.set_reconcile_requested(obj, &requested_at)
        })
        .await
    }

    /// Wall clock, nudged forward so successive requests strictly increase
    fn next_reconcile_time(&self) -> DateTime<Utc> {
        let mut last = self
            .last_reconcile
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut now = Utc::now();
        if let Some(previous) = *last {
            if now <= previous {
                now = previous + TimeDelta::nanoseconds(1);
            }
        }
        *last = Some(now);
        now
    }

    /// Namespace mutations address: the selection, else the cluster's own
    fn target_namespace(&self, connection: &ClusterConnection) -> String {
        self.registry
            .namespace()
            .or_else(|| connection.target.namespace.clone())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    /// `edit` returns false when the object's shape does not allow the change;
    /// nothing is submitted then.
    async fn mutate<F>(
        &self,
        kind: FluxResourceKind,
        name: &str,
        action: &str,
        edit: F,
    ) -> ManagerResult<()>
    where
        F: FnOnce(&mut Value) -> bool,
    {
        if self.shutdown.is_triggered() {
            return Err(ManagerError::Cancelled);
        }
        let connection = self.registry.current_connection()?;
        let cluster = connection.name().to_string();
        let namespace = self.target_namespace(&connection);
        let deadline = Instant::now() + MUTATION_TIMEOUT;

        let not_found = || ManagerError::NotFound {
            cluster: cluster.clone(),
            kind,
            namespace: namespace.clone(),
            name: name.to_string(),
        };

        let sequence = async {
            let fetched =
                tokio::time::timeout_at(deadline, connection.client.get(kind, &namespace, name))
                    .await
                    .unwrap_or(Err(ClientError::Timeout(MUTATION_TIMEOUT)));
            let mut object = match fetched {
                Ok(object) => object,
                Err(ClientError::NotFound(_)) => return Err(not_found()),
                Err(source) => {
                    return Err(ManagerError::Get {
                        cluster: cluster.clone(),
                        kind,
                        namespace: namespace.clone(),
                        name: name.to_string(),
                        source,
                    });
                }
            };

            if !edit(&mut object) {
                return Err(ManagerError::Update {
                    cluster: cluster.clone(),
                    kind,
                    namespace: namespace.clone(),
                    name: name.to_string(),
                    source: ClientError::Api(format!("malformed object: cannot apply {}", action)),
                });
            }

            let updated = tokio::time::timeout_at(deadline, connection.client.update(kind, object))
                .await
                .unwrap_or(Err(ClientError::Timeout(MUTATION_TIMEOUT)));
            match updated {
                Ok(()) => Ok(()),
                Err(ClientError::NotFound(_)) => Err(not_found()),
                Err(ClientError::Conflict(_)) => Err(ManagerError::UpdateConflict {
                    cluster: cluster.clone(),
                    kind,
                    namespace: namespace.clone(),
                    name: name.to_string(),
                }),
                Err(source) => Err(ManagerError::Update {
                    cluster: cluster.clone(),
                    kind,
                    namespace: namespace.clone(),
                    name: name.to_string(),
                    source,
                }),
            }
        };

        tokio::select! {
            _ = self.shutdown.cancelled() => return Err(ManagerError::Cancelled),
            result = sequence => result?,
        }

        tracing::info!("{} {}/{} {} in cluster {}", kind, namespace, name, action, cluster);
        self.publish_refreshed(connection, kind);
        Ok(())
    }

    /// Push a fresh snapshot of the mutated kind ahead of the next tick
    fn publish_refreshed(&self, connection: ClusterConnection, kind: FluxResourceKind) {
        let Some(publisher) = self.bus.publisher() else {
            return;
        };
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let cluster = connection.name().to_string();
            let publish = async {
                match list_normalized(&connection, kind, None).await {
                    Ok(resources) => {
                        publisher
                            .publish_resources(ResourceUpdate {
                                cluster: cluster.clone(),
                                kind,
                                resources,
                            })
                            .await
                    }
                    Err(error) => publisher.publish_error(&cluster, error).await,
                }
            };
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = publish => {}
            }
        });
    }
}
