//! Update bus between background producers and a subscriber
//!
//! Three bounded channels carry resource snapshots, event batches and errors.
//! Producers hold a [`Publisher`]; every send races the shutdown signal so a
//! full buffer never wedges a worker. [`UpdateBus::close`] only returns once
//! every publisher has been dropped, at which point all three channels are
//! closed for good.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use super::shutdown::Shutdown;
use crate::error::ManagerError;
use crate::models::{ClusterEvent, FluxResourceKind, Resource};

/// Buffer size of each update channel
pub const CHANNEL_CAPACITY: usize = 100;

/// Full-replace snapshot of one (cluster, kind)
#[derive(Debug, Clone)]
pub struct ResourceUpdate {
    pub cluster: String,
    pub kind: FluxResourceKind,
    pub resources: Vec<Resource>,
}

/// Latest Flux-related events of one cluster
#[derive(Debug, Clone)]
pub struct EventUpdate {
    pub cluster: String,
    pub events: Vec<ClusterEvent>,
}

/// A background failure attributed to one cluster
#[derive(Debug, Clone)]
pub struct ErrorUpdate {
    pub cluster: String,
    pub error: ManagerError,
}

/// Any message read from the bus
#[derive(Debug, Clone)]
pub enum Update {
    Resources(ResourceUpdate),
    Events(EventUpdate),
    Error(ErrorUpdate),
}

struct Senders {
    resources: mpsc::Sender<ResourceUpdate>,
    events: mpsc::Sender<EventUpdate>,
    errors: mpsc::Sender<ErrorUpdate>,
    /// Never sent on; its receiver observes close once all clones are gone
    alive: mpsc::Sender<()>,
}

/// Owner of the three update channels
pub struct UpdateBus {
    shutdown: Shutdown,
    senders: Mutex<Option<Senders>>,
    alive_rx: Mutex<Option<mpsc::Receiver<()>>>,
    subscriber: Mutex<Option<UpdateSubscriber>>,
}

impl UpdateBus {
    pub fn new(shutdown: Shutdown) -> Self {
        let (resources, resources_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (events, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (errors, errors_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (alive, alive_rx) = mpsc::channel(1);

        Self {
            shutdown,
            senders: Mutex::new(Some(Senders {
                resources,
                events,
                errors,
                alive,
            })),
            alive_rx: Mutex::new(Some(alive_rx)),
            subscriber: Mutex::new(Some(UpdateSubscriber::new(
                resources_rx,
                events_rx,
                errors_rx,
            ))),
        }
    }

    /// Hand out the receiving side; only the first call gets it
    pub fn subscribe(&self) -> Option<UpdateSubscriber> {
        self.subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Register a producer; `None` once the bus is closing
    pub fn publisher(&self) -> Option<Publisher> {
        let senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        senders.as_ref().map(|s| Publisher {
            resources: s.resources.clone(),
            events: s.events.clone(),
            errors: s.errors.clone(),
            shutdown: self.shutdown.clone(),
            _alive: s.alive.clone(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Stop handing out publishers and wait for the live ones to go away
    ///
    /// Trigger the shutdown signal first, otherwise a publisher blocked on a
    /// full channel keeps this waiting until the subscriber drains it.
    pub async fn close(&self) {
        drop(
            self.senders
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let alive_rx = self
            .alive_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut alive_rx) = alive_rx {
            // Nothing is ever sent, so this returns None once the last
            // publisher is dropped
            while alive_rx.recv().await.is_some() {}
            tracing::debug!("Update bus closed");
        }
    }
}

/// Producer handle; dropping it releases the close barrier
#[derive(Clone)]
pub struct Publisher {
    resources: mpsc::Sender<ResourceUpdate>,
    events: mpsc::Sender<EventUpdate>,
    errors: mpsc::Sender<ErrorUpdate>,
    shutdown: Shutdown,
    _alive: mpsc::Sender<()>,
}

impl Publisher {
    /// Returns whether the update was delivered
    pub async fn publish_resources(&self, update: ResourceUpdate) -> bool {
        send(&self.shutdown, &self.resources, update).await
    }

    pub async fn publish_events(&self, update: EventUpdate) -> bool {
        send(&self.shutdown, &self.events, update).await
    }

    pub async fn publish_error(&self, cluster: &str, error: ManagerError) -> bool {
        tracing::warn!("{}", error);
        let update = ErrorUpdate {
            cluster: cluster.to_string(),
            error,
        };
        send(&self.shutdown, &self.errors, update).await
    }
}

async fn send<T>(shutdown: &Shutdown, tx: &mpsc::Sender<T>, message: T) -> bool {
    if shutdown.is_triggered() {
        return false;
    }
    let delivered = tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        result = tx.send(message) => result.is_ok(),
    };
    if !delivered {
        tracing::debug!("Dropped update: bus closed or shutting down");
    }
    delivered
}

/// Receiving side of the bus
pub struct UpdateSubscriber {
    pub resources: mpsc::Receiver<ResourceUpdate>,
    pub events: mpsc::Receiver<EventUpdate>,
    pub errors: mpsc::Receiver<ErrorUpdate>,
    open: [bool; 3],
}

impl UpdateSubscriber {
    fn new(
        resources: mpsc::Receiver<ResourceUpdate>,
        events: mpsc::Receiver<EventUpdate>,
        errors: mpsc::Receiver<ErrorUpdate>,
    ) -> Self {
        Self {
            resources,
            events,
            errors,
            open: [true; 3],
        }
    }

    /// Next message from any channel; `None` once all three are closed
    pub async fn recv(&mut self) -> Option<Update> {
        while self.open.iter().any(|o| *o) {
            tokio::select! {
                msg = self.resources.recv(), if self.open[0] => match msg {
                    Some(u) => return Some(Update::Resources(u)),
                    None => self.open[0] = false,
                },
                msg = self.events.recv(), if self.open[1] => match msg {
                    Some(u) => return Some(Update::Events(u)),
                    None => self.open[1] = false,
                },
                msg = self.errors.recv(), if self.open[2] => match msg {
                    Some(u) => return Some(Update::Error(u)),
                    None => self.open[2] = false,
                },
            }
        }
        None
    }

    /// Whether all three channels are closed and empty
    pub fn is_terminated(&self) -> bool {
        self.resources.is_closed()
            && self.resources.is_empty()
            && self.events.is_closed()
            && self.events.is_empty()
            && self.errors.is_closed()
            && self.errors.is_empty()
    }
}
