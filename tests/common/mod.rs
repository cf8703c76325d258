//! In-memory cluster fakes shared by the integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fluxfleet::FluxResourceKind;
use fluxfleet::config::Config;
use fluxfleet::kube::{ClientError, ClusterClient, ClusterConnector, ClusterTarget};
use fluxfleet::models::{ClusterEvent, EventFilter};
use serde_json::{Value, json};

type ObjectKey = (FluxResourceKind, String, String);

/// A cluster whose objects live in a map
#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<BTreeMap<ObjectKey, Value>>,
    failing_kinds: Mutex<HashSet<FluxResourceKind>>,
    list_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    list_calls: AtomicUsize,
    gets: AtomicUsize,
    updates: AtomicUsize,
    race_next_update: AtomicBool,
    /// Shared across clusters to observe fleet-wide concurrency
    fleet_in_flight: Option<Arc<ConcurrencyGauge>>,
}

/// Tracks current and peak concurrent callers
#[derive(Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_gauge(gauge: Arc<ConcurrencyGauge>, list_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fleet_in_flight: Some(gauge),
            list_delay: Mutex::new(list_delay),
            ..Self::default()
        })
    }

    pub fn insert(&self, kind: FluxResourceKind, object: Value) {
        let namespace = object["metadata"]["namespace"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let name = object["metadata"]["name"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        self.objects
            .lock()
            .unwrap()
            .insert((kind, namespace, name), object);
    }

    pub fn object(&self, kind: FluxResourceKind, namespace: &str, name: &str) -> Option<Value> {
        self.objects
            .lock()
            .unwrap()
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn fail_kind(&self, kind: FluxResourceKind) {
        self.failing_kinds.lock().unwrap().insert(kind);
    }

    /// Make the next update lose against a concurrent writer
    pub fn race_next_update(&self) {
        self.race_next_update.store(true, Ordering::SeqCst);
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

fn bump_version(object: &mut Value) {
    let next = object["metadata"]["resourceVersion"]
        .as_str()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    object["metadata"]["resourceVersion"] = Value::String(next.to_string());
}

/// Client view of a [`FakeCluster`]
pub struct FakeClient(pub Arc<FakeCluster>);

#[async_trait::async_trait]
impl ClusterClient for FakeClient {
    async fn test_connection(&self, _timeout: Duration) -> Result<(), ClientError> {
        Ok(())
    }

    async fn list(
        &self,
        kind: FluxResourceKind,
        namespace: Option<String>,
    ) -> Result<Vec<Value>, ClientError> {
        let cluster = &self.0;
        cluster.list_calls.fetch_add(1, Ordering::SeqCst);
        cluster.in_flight.fetch_add(1, Ordering::SeqCst);
        if let Some(gauge) = &cluster.fleet_in_flight {
            gauge.enter();
        }

        let delay = *cluster.list_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = if cluster.failing_kinds.lock().unwrap().contains(&kind) {
            Err(ClientError::Api(format!("{} is forbidden", kind.plural())))
        } else {
            Ok(cluster
                .objects
                .lock()
                .unwrap()
                .iter()
                .filter(|((k, ns, _), _)| {
                    *k == kind && namespace.as_deref().is_none_or(|want| want == ns)
                })
                .map(|(_, object)| object.clone())
                .collect())
        };

        if let Some(gauge) = &cluster.fleet_in_flight {
            gauge.exit();
        }
        cluster.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn get(
        &self,
        kind: FluxResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Value, ClientError> {
        self.0.gets.fetch_add(1, Ordering::SeqCst);
        self.0
            .object(kind, namespace, name)
            .ok_or_else(|| ClientError::NotFound(format!("{}/{}", namespace, name)))
    }

    async fn update(&self, kind: FluxResourceKind, mut object: Value) -> Result<(), ClientError> {
        let namespace = object["metadata"]["namespace"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let name = object["metadata"]["name"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        let mut objects = self.0.objects.lock().unwrap();
        let key = (kind, namespace.clone(), name.clone());
        if self.0.race_next_update.swap(false, Ordering::SeqCst) {
            if let Some(stored) = objects.get_mut(&key) {
                bump_version(stored);
            }
        }
        let Some(stored) = objects.get(&key) else {
            return Err(ClientError::NotFound(format!("{}/{}", namespace, name)));
        };
        if stored["metadata"]["resourceVersion"] != object["metadata"]["resourceVersion"] {
            return Err(ClientError::Conflict(format!(
                "the object {}/{} has been modified",
                namespace, name
            )));
        }

        bump_version(&mut object);
        objects.insert(key, object);
        self.0.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_events(
        &self,
        _namespace: Option<String>,
        _filter: &EventFilter,
    ) -> Result<Vec<ClusterEvent>, ClientError> {
        Ok(Vec::new())
    }
}

/// Connector resolving target names to fake clusters
#[derive(Default)]
pub struct FakeConnector {
    clusters: Mutex<HashMap<String, Arc<FakeCluster>>>,
    hanging: Mutex<HashSet<String>>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, name: &str, cluster: Arc<FakeCluster>) {
        self.clusters
            .lock()
            .unwrap()
            .insert(name.to_string(), cluster);
    }

    /// Connecting to `name` never answers
    pub fn hang(&self, name: &str) {
        self.hanging.lock().unwrap().insert(name.to_string());
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ClusterConnector for FakeConnector {
    async fn connect(&self, target: &ClusterTarget) -> Result<Arc<dyn ClusterClient>, ClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.hanging.lock().unwrap().contains(&target.name) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let cluster = self.clusters.lock().unwrap().get(&target.name).cloned();
        match cluster {
            Some(cluster) => Ok(Arc::new(FakeClient(cluster))),
            None => Err(ClientError::Api(format!(
                "dial tcp {}: connection refused",
                target.name
            ))),
        }
    }
}

/// Config whose default cluster is the context `default_cluster`
pub fn fleet_config(default_cluster: &str, others: &[&str]) -> Config {
    let mut config = Config::default();
    config.current_context = Some(default_cluster.to_string());
    config.clusters = others
        .iter()
        .map(|name| fluxfleet::config::ClusterConfig {
            name: name.to_string(),
            context: Some(name.to_string()),
            kubeconfig: None,
            namespace: None,
            description: None,
        })
        .collect();
    config.defaults.events_enabled = false;
    config
}

pub fn kustomization(namespace: &str, name: &str, ready: &str) -> Value {
    json!({
        "apiVersion": "kustomize.toolkit.fluxcd.io/v1",
        "kind": "Kustomization",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "resourceVersion": "1",
            "creationTimestamp": "2024-01-01T00:00:00Z"
        },
        "spec": {
            "interval": "10m",
            "path": "./apps",
            "sourceRef": {"kind": "GitRepository", "name": "flux-system"}
        },
        "status": {
            "conditions": [{
                "type": "Ready",
                "status": ready,
                "reason": "ReconciliationSucceeded",
                "message": "Applied revision: main@sha1:abc123"
            }]
        }
    })
}

pub fn helm_release(namespace: &str, name: &str) -> Value {
    json!({
        "apiVersion": "helm.toolkit.fluxcd.io/v2",
        "kind": "HelmRelease",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "resourceVersion": "7",
            "creationTimestamp": "2024-01-01T00:00:00Z"
        },
        "spec": {
            "interval": "5m",
            "chart": {"spec": {"chart": name, "version": "6.x"}}
        }
    })
}
