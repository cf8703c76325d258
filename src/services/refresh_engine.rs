//! Periodic resource refresh across all connected clusters
//!
//! Each tick snapshots the registry and spawns one worker per cluster. A
//! semaphore shared by every tick caps how many clusters are refreshed at
//! once. A worker walks the four kinds in order and publishes one update per
//! kind, either the full normalized list or the error that prevented it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use super::connection_registry::{ClusterConnection, ConnectionRegistry};
use super::shutdown::Shutdown;
use super::update_bus::{Publisher, ResourceUpdate, UpdateBus};
use crate::config::defaults;
use crate::error::{ManagerError, ManagerResult};
use crate::kube::ClientError;
use crate::models::{FluxResourceKind, Resource, normalize_list};

/// Bound for a single list call
pub const LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// List and normalize one kind in one cluster
///
/// The snapshot time is taken when the list returns, so ages are always
/// relative to the refresh that produced them.
pub async fn list_normalized(
    connection: &ClusterConnection,
    kind: FluxResourceKind,
    namespace: Option<String>,
) -> ManagerResult<Vec<Resource>> {
    let list_error = |source| ManagerError::List {
        cluster: connection.name().to_string(),
        what: kind.to_string(),
        source,
    };

    let items = tokio::time::timeout(LIST_TIMEOUT, connection.client.list(kind, namespace))
        .await
        .map_err(|_| list_error(ClientError::Timeout(LIST_TIMEOUT)))?
        .map_err(list_error)?;

    Ok(normalize_list(kind, &items, Utc::now()))
}

pub struct RefreshEngine {
    registry: Arc<ConnectionRegistry>,
    bus: Arc<UpdateBus>,
    shutdown: Shutdown,
    interval: Duration,
    limit: Arc<Semaphore>,
}

impl RefreshEngine {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        bus: Arc<UpdateBus>,
        shutdown: Shutdown,
        interval: Duration,
        max_concurrent_clusters: usize,
    ) -> Self {
        // A zero period would make the ticker panic
        let interval = if interval.is_zero() {
            tracing::warn!("Refresh interval of zero ignored, using the default");
            defaults::refresh_interval()
        } else {
            interval
        };
        Self {
            registry,
            bus,
            shutdown,
            interval,
            limit: Arc::new(Semaphore::new(max_concurrent_clusters.max(1))),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the supervisor loop on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Tick until shutdown; the first refresh happens one interval in
    pub async fn run(self) {
        tracing::debug!("Refresh engine started (interval {:?})", self.interval);
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.refresh_once().await;
        }
        tracing::debug!("Refresh engine stopped");
    }

    /// One tick: refresh every connected cluster and wait for all workers
    pub async fn refresh_once(&self) {
        let Some(publisher) = self.bus.publisher() else {
            return;
        };
        let connections = self.registry.snapshot();
        tracing::debug!("Refreshing {} cluster(s)", connections.len());

        let mut workers = JoinSet::new();
        for connection in connections {
            let limit = self.limit.clone();
            let publisher = publisher.clone();
            let shutdown = self.shutdown.clone();

            workers.spawn(async move {
                let _permit = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    permit = limit.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };
                refresh_cluster(&connection, &publisher, &shutdown).await;
            });
        }
        drop(publisher);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::warn!("Refresh worker failed: {}", e);
            }
        }
    }
}

async fn refresh_cluster(connection: &ClusterConnection, publisher: &Publisher, shutdown: &Shutdown) {
    let cluster = connection.name();

    for &kind in FluxResourceKind::all() {
        let listed = tokio::select! {
            _ = shutdown.cancelled() => return,
            listed = list_normalized(connection, kind, None) => listed,
        };

        let delivered = match listed {
            Ok(resources) => {
                tracing::debug!("{}: {} {}(s)", cluster, resources.len(), kind);
                publisher
                    .publish_resources(ResourceUpdate {
                        cluster: cluster.to_string(),
                        kind,
                        resources,
                    })
                    .await
            }
            // One failed kind never stops the remaining ones
            Err(error) => publisher.publish_error(cluster, error).await,
        };

        if !delivered && shutdown.is_triggered() {
            return;
        }
    }
}
