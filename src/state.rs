//! Fleet state cache for update consumers
//!
//! Applies bus messages to an in-memory view. Each `ResourceUpdate` fully
//! replaces what was known for its (cluster, kind) key.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::ManagerError;
use crate::models::{ClusterEvent, FluxResourceKind, Resource};
use crate::services::{ErrorUpdate, EventUpdate, ResourceUpdate, Update};

/// Key of one full-replace slot
pub type SlotKey = (String, FluxResourceKind);

/// Per-slot summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCounts {
    pub total: usize,
    pub ready: usize,
    pub suspended: usize,
}

#[derive(Default)]
struct Inner {
    resources: HashMap<SlotKey, Vec<Resource>>,
    events: HashMap<String, Vec<ClusterEvent>>,
    errors: HashMap<String, ManagerError>,
}

/// Thread-safe fleet state store
#[derive(Clone, Default)]
pub struct FleetState {
    inner: Arc<RwLock<Inner>>,
}

impl FleetState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply any bus message
    pub fn apply(&self, update: Update) {
        match update {
            Update::Resources(u) => self.apply_resources(u),
            Update::Events(u) => self.apply_events(u),
            Update::Error(u) => self.apply_error(u),
        }
    }

    /// Replace the slot for the update's (cluster, kind)
    pub fn apply_resources(&self, update: ResourceUpdate) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .resources
            .insert((update.cluster, update.kind), update.resources);
    }

    pub fn apply_events(&self, update: EventUpdate) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.events.insert(update.cluster, update.events);
    }

    /// Remember the latest error per cluster
    pub fn apply_error(&self, update: ErrorUpdate) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.errors.insert(update.cluster, update.error);
    }

    pub fn get(&self, cluster: &str, kind: FluxResourceKind) -> Vec<Resource> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .resources
            .get(&(cluster.to_string(), kind))
            .cloned()
            .unwrap_or_default()
    }

    /// Every resource known for one cluster, in kind order
    pub fn by_cluster(&self, cluster: &str) -> Vec<Resource> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        FluxResourceKind::all()
            .iter()
            .filter_map(|kind| inner.resources.get(&(cluster.to_string(), *kind)))
            .flatten()
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Resource> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.resources.values().flatten().cloned().collect()
    }

    pub fn counts(&self) -> BTreeMap<SlotKey, SlotCounts> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .resources
            .iter()
            .map(|(key, resources)| {
                let counts = SlotCounts {
                    total: resources.len(),
                    ready: resources.iter().filter(|r| r.ready).count(),
                    suspended: resources.iter().filter(|r| r.suspended).count(),
                };
                (key.clone(), counts)
            })
            .collect()
    }

    pub fn events(&self, cluster: &str) -> Vec<ClusterEvent> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.events.get(cluster).cloned().unwrap_or_default()
    }

    pub fn last_error(&self, cluster: &str) -> Option<ManagerError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.errors.get(cluster).cloned()
    }

    /// Forget everything about one cluster
    pub fn remove_cluster(&self, cluster: &str) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.resources.retain(|(c, _), _| c != cluster);
        inner.events.remove(cluster);
        inner.errors.remove(cluster);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *inner = Inner::default();
    }
}
