//! Fleet manager facade
//!
//! `FleetManager` owns the connection registry, the update bus, both
//! background engines and the mutation service. A consumer calls
//! [`FleetManager::start`] once, drains the [`UpdateSubscriber`], and calls
//! [`FleetManager::stop`] once on the way out.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use super::connection_registry::{ClusterConnection, ConnectionRegistry};
use super::event_engine::EventEngine;
use super::mutation_service::MutationService;
use super::refresh_engine::{RefreshEngine, list_normalized};
use super::shutdown::Shutdown;
use super::update_bus::{UpdateBus, UpdateSubscriber};
use crate::config::Config;
use crate::error::{ManagerError, ManagerResult};
use crate::kube::{ClusterConnector, ClusterTarget, KubeConnector};
use crate::models::{FluxResourceKind, Resource};

/// Name used for the default cluster when no context name is known
pub const FALLBACK_CLUSTER_NAME: &str = "default";

pub struct FleetManager {
    config: Config,
    shutdown: Shutdown,
    registry: Arc<ConnectionRegistry>,
    bus: Arc<UpdateBus>,
    mutations: MutationService,
    engines: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl FleetManager {
    /// Manager backed by real clusters through kube-rs
    pub fn new(config: Config) -> Self {
        Self::with_connector(config, Arc::new(KubeConnector))
    }

    pub fn with_connector(config: Config, connector: Arc<dyn ClusterConnector>) -> Self {
        let shutdown = Shutdown::new();
        let registry = Arc::new(ConnectionRegistry::new(
            connector,
            config.effective_namespace(),
        ));
        let bus = Arc::new(UpdateBus::new(shutdown.clone()));
        let mutations = MutationService::new(registry.clone(), bus.clone(), shutdown.clone());

        Self {
            config,
            shutdown,
            registry,
            bus,
            mutations,
            engines: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Receiving side of the update channels; only the first call gets it
    pub fn subscribe(&self) -> Option<UpdateSubscriber> {
        self.bus.subscribe()
    }

    /// Target for the cluster the active kubeconfig selection points at
    pub fn default_target(&self) -> ClusterTarget {
        let name = self
            .config
            .current_context
            .clone()
            .or_else(|| crate::kube::current_context(self.config.current_kubeconfig.as_deref()))
            .unwrap_or_else(|| FALLBACK_CLUSTER_NAME.to_string());

        ClusterTarget {
            name,
            kubeconfig: self.config.current_kubeconfig.clone(),
            context: self.config.current_context.clone(),
            namespace: self.config.effective_namespace(),
        }
    }

    /// Connect the default and configured clusters and start the engines
    ///
    /// Fails only when the default cluster cannot be reached. Every other
    /// cluster that fails is reported once on the error channel and left out.
    /// Calling it again retries the clusters that are not connected.
    ///
    /// A `stop()` while connecting makes this return `Cancelled` promptly,
    /// and no engine is started afterwards.
    pub async fn start(&self) -> ManagerResult<()> {
        if self.shutdown.is_triggered() {
            return Err(ManagerError::Cancelled);
        }

        let default = self.default_target();
        if !self.registry.contains(&default.name) {
            self.connect(default.clone()).await?;
        }

        for cluster in &self.config.clusters {
            if self.registry.contains(&cluster.name) {
                continue;
            }
            match self.connect(cluster.target()).await {
                Ok(_) => {}
                Err(ManagerError::Cancelled) => return Err(ManagerError::Cancelled),
                Err(error) => {
                    if let Some(publisher) = self.bus.publisher() {
                        publisher.publish_error(&cluster.name, error).await;
                    }
                }
            }
        }

        if self.registry.current().is_none() {
            self.registry.set_current(&default.name)?;
        }

        self.spawn_engines()
    }

    /// Connect through the registry unless shutdown fires first
    async fn connect(&self, target: ClusterTarget) -> ManagerResult<ClusterConnection> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(ManagerError::Cancelled),
            connected = self.registry.connect(target) => connected,
        }
    }

    /// Spawn both engines on the first successful start
    ///
    /// The shutdown check happens under the engines lock, and `stop()`
    /// triggers before it takes that lock, so a handle pushed here is always
    /// joined.
    fn spawn_engines(&self) -> ManagerResult<()> {
        let mut engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);
        if self.shutdown.is_triggered() {
            return Err(ManagerError::Cancelled);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let defaults = &self.config.defaults;

        engines.push(
            RefreshEngine::new(
                self.registry.clone(),
                self.bus.clone(),
                self.shutdown.clone(),
                defaults.refresh_interval,
                defaults.max_concurrent_clusters,
            )
            .spawn(),
        );

        if defaults.events_enabled {
            engines.push(
                EventEngine::new(
                    self.registry.clone(),
                    self.bus.clone(),
                    self.shutdown.clone(),
                    defaults.max_concurrent_clusters,
                )
                .spawn(),
            );
        }
        tracing::info!(
            "Fleet manager started with {} cluster(s), refreshing every {:?}",
            self.registry.list_names().len(),
            defaults.refresh_interval
        );
        Ok(())
    }

    /// Stop the engines and close the update channels
    ///
    /// Once this returns no producer is alive and the subscriber will see all
    /// three channels end. Safe to call more than once.
    pub async fn stop(&self) {
        self.shutdown.trigger();

        let engines = std::mem::take(
            &mut *self.engines.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for joined in futures::future::join_all(engines).await {
            if let Err(e) = joined {
                tracing::warn!("Engine task ended abnormally: {}", e);
            }
        }

        self.bus.close().await;
        tracing::info!("Fleet manager stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Add (or replace) a connection after start-up
    pub async fn connect_cluster(&self, target: ClusterTarget) -> ManagerResult<()> {
        if self.shutdown.is_triggered() {
            return Err(ManagerError::Cancelled);
        }
        self.connect(target).await.map(|_| ())
    }

    /// Names of the connected clusters
    pub fn clusters(&self) -> BTreeSet<String> {
        self.registry.list_names()
    }

    pub fn set_current_cluster(&self, name: &str) -> ManagerResult<()> {
        self.registry.set_current(name)
    }

    pub fn current_cluster(&self) -> Option<String> {
        self.registry.current()
    }

    /// `None` selects all namespaces
    pub fn set_current_namespace(&self, namespace: Option<String>) {
        self.registry.set_namespace(namespace);
    }

    pub fn current_namespace(&self) -> Option<String> {
        self.registry.namespace()
    }

    /// List one kind in the current cluster and namespace, on demand
    pub async fn list_resources(&self, kind: FluxResourceKind) -> ManagerResult<Vec<Resource>> {
        let connection = self.registry.current_connection()?;
        let namespace = self.registry.namespace();
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(ManagerError::Cancelled),
            listed = list_normalized(&connection, kind, namespace) => listed,
        }
    }

    pub async fn suspend_resource(&self, kind: &str, name: &str) -> ManagerResult<()> {
        self.mutations.suspend(parse_kind(kind)?, name).await
    }

    pub async fn resume_resource(&self, kind: &str, name: &str) -> ManagerResult<()> {
        self.mutations.resume(parse_kind(kind)?, name).await
    }

    pub async fn reconcile_resource(&self, kind: &str, name: &str) -> ManagerResult<()> {
        self.mutations.reconcile(parse_kind(kind)?, name).await
    }
}

impl Drop for FleetManager {
    fn drop(&mut self) {
        // Engines observe this even if stop() was never awaited
        self.shutdown.trigger();
    }
}

fn parse_kind(kind: &str) -> ManagerResult<FluxResourceKind> {
    FluxResourceKind::from_str_case_insensitive(kind)
        .ok_or_else(|| ManagerError::UnsupportedKind(kind.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind() {
        assert_eq!(
            parse_kind("Kustomization").unwrap(),
            FluxResourceKind::Kustomization
        );
        assert_eq!(parse_kind("hr").unwrap(), FluxResourceKind::HelmRelease);
        insta::assert_snapshot!(
            parse_kind("Bucket").unwrap_err().to_string(),
            @"unsupported resource kind: Bucket"
        );
    }

    #[test]
    fn test_default_target_uses_runtime_context() {
        let mut config = Config::default();
        config.current_context = Some("prod-admin".to_string());
        config.current_namespace = Some("apps".to_string());

        let manager = FleetManager::new(config);
        let target = manager.default_target();
        assert_eq!(target.name, "prod-admin");
        assert_eq!(target.context.as_deref(), Some("prod-admin"));
        assert_eq!(target.namespace.as_deref(), Some("apps"));
    }
}
