//! Periodic collection of Flux-related cluster events
//!
//! Runs beside the refresh engine on a fixed, shorter interval. Fetches go
//! through a bounded pool like the refresh fan-out, and a tick waits for its
//! fetches before the next one can start.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use super::connection_registry::{ClusterConnection, ConnectionRegistry};
use super::shutdown::Shutdown;
use super::update_bus::{EventUpdate, Publisher, UpdateBus};
use crate::error::ManagerError;
use crate::kube::ClientError;
use crate::models::EventFilter;

pub const EVENTS_INTERVAL: Duration = Duration::from_secs(2);
pub const EVENTS_TIMEOUT: Duration = Duration::from_secs(5);

pub struct EventEngine {
    registry: Arc<ConnectionRegistry>,
    bus: Arc<UpdateBus>,
    shutdown: Shutdown,
    filter: EventFilter,
    limit: Arc<Semaphore>,
}

impl EventEngine {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        bus: Arc<UpdateBus>,
        shutdown: Shutdown,
        max_concurrent_clusters: usize,
    ) -> Self {
        Self {
            registry,
            bus,
            shutdown,
            filter: EventFilter::flux(),
            limit: Arc::new(Semaphore::new(max_concurrent_clusters.max(1))),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        tracing::debug!("Event engine started");
        let mut ticker = tokio::time::interval_at(Instant::now() + EVENTS_INTERVAL, EVENTS_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.collect_once().await;
        }
        tracing::debug!("Event engine stopped");
    }

    /// One tick: fetch events from every connected cluster
    pub async fn collect_once(&self) {
        let Some(publisher) = self.bus.publisher() else {
            return;
        };

        let mut fetches = JoinSet::new();
        for connection in self.registry.snapshot() {
            let limit = self.limit.clone();
            let publisher = publisher.clone();
            let shutdown = self.shutdown.clone();
            let filter = self.filter.clone();

            fetches.spawn(async move {
                let _permit = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    permit = limit.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = collect_cluster(&connection, &filter, &publisher) => {}
                }
            });
        }
        drop(publisher);

        while let Some(joined) = fetches.join_next().await {
            if let Err(e) = joined {
                tracing::warn!("Event fetch failed: {}", e);
            }
        }
    }
}

async fn collect_cluster(connection: &ClusterConnection, filter: &EventFilter, publisher: &Publisher) {
    let cluster = connection.name();
    let fetched = tokio::time::timeout(
        EVENTS_TIMEOUT,
        connection.client.list_events(None, filter),
    )
    .await
    .unwrap_or(Err(ClientError::Timeout(EVENTS_TIMEOUT)));

    match fetched {
        Ok(events) => {
            tracing::debug!("{}: {} event(s)", cluster, events.len());
            publisher
                .publish_events(EventUpdate {
                    cluster: cluster.to_string(),
                    events,
                })
                .await;
        }
        Err(source) => {
            let error = ManagerError::List {
                cluster: cluster.to_string(),
                what: "events".to_string(),
                source,
            };
            publisher.publish_error(cluster, error).await;
        }
    }
}
