//! Cluster client seam
//!
//! The fleet manager only talks to clusters through [`ClusterConnector`] and
//! [`ClusterClient`]. [`KubeConnector`]/[`KubeClusterClient`] are the kube-rs
//! implementations; tests substitute fakes or mocks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Event, Namespace};
use kube::api::{ListParams, PostParams};
use kube::core::{ApiResource, DynamicObject};
use kube::{Api, Client};
use serde_json::Value;

use crate::models::{ClusterEvent, EventFilter, FluxResourceKind};

/// Errors reported by a cluster client
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("kubernetes API error: {0}")]
    Api(String),
}

impl From<kube::Error> for ClientError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => {
                ClientError::NotFound(resp.message.clone())
            }
            kube::Error::Api(resp) if resp.code == 409 => {
                ClientError::Conflict(resp.message.clone())
            }
            _ => ClientError::Api(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Api(format!("malformed object: {}", err))
    }
}

/// Where and how to reach one cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterTarget {
    /// Registry name of the connection
    pub name: String,
    /// Explicit kubeconfig file; default loading rules when unset
    pub kubeconfig: Option<PathBuf>,
    /// Kubeconfig context; the file's current context when unset
    pub context: Option<String>,
    /// Namespace scope for operations addressed to this cluster
    pub namespace: Option<String>,
}

/// Operations the fleet manager needs from one cluster's API
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    /// Cheap reachability check bounded by `timeout`
    async fn test_connection(&self, timeout: Duration) -> Result<(), ClientError>;

    /// List raw objects of one kind; `None` lists every namespace
    async fn list(
        &self,
        kind: FluxResourceKind,
        namespace: Option<String>,
    ) -> Result<Vec<Value>, ClientError>;

    async fn get(
        &self,
        kind: FluxResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Value, ClientError>;

    /// Replace an object. Must fail with [`ClientError::Conflict`] when the
    /// object changed since it was read.
    async fn update(&self, kind: FluxResourceKind, object: Value) -> Result<(), ClientError>;

    async fn list_events(
        &self,
        namespace: Option<String>,
        filter: &EventFilter,
    ) -> Result<Vec<ClusterEvent>, ClientError>;
}

/// Builds clients for cluster targets
#[async_trait::async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self, target: &ClusterTarget) -> Result<Arc<dyn ClusterClient>, ClientError>;
}

/// kube-rs backed [`ClusterConnector`]
#[derive(Debug, Default, Clone)]
pub struct KubeConnector;

#[async_trait::async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, target: &ClusterTarget) -> Result<Arc<dyn ClusterClient>, ClientError> {
        let client =
            super::create_client(target.kubeconfig.as_deref(), target.context.as_deref()).await?;
        tracing::debug!(
            "Built client for cluster {} (context {:?})",
            target.name,
            target.context
        );
        Ok(Arc::new(KubeClusterClient::new(client)))
    }
}

/// kube-rs backed [`ClusterClient`] working on `DynamicObject`s
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, ar: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, ar),
            None => Api::all_with(self.client.clone(), ar),
        }
    }
}

#[async_trait::async_trait]
impl ClusterClient for KubeClusterClient {
    async fn test_connection(&self, timeout: Duration) -> Result<(), ClientError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        match tokio::time::timeout(timeout, namespaces.get("default")).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ClientError::Timeout(timeout)),
        }
    }

    async fn list(
        &self,
        kind: FluxResourceKind,
        namespace: Option<String>,
    ) -> Result<Vec<Value>, ClientError> {
        let api = self.api(&kind.api_resource(), namespace.as_deref());
        let list = api.list(&ListParams::default()).await?;
        list.items
            .iter()
            .map(|obj| serde_json::to_value(obj).map_err(ClientError::from))
            .collect()
    }

    async fn get(
        &self,
        kind: FluxResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Value, ClientError> {
        let api = self.api(&kind.api_resource(), Some(namespace));
        let obj = api.get(name).await?;
        Ok(serde_json::to_value(&obj)?)
    }

    async fn update(&self, kind: FluxResourceKind, object: Value) -> Result<(), ClientError> {
        let obj: DynamicObject = serde_json::from_value(object)?;
        let name = obj
            .metadata
            .name
            .clone()
            .ok_or_else(|| ClientError::Api("object has no metadata.name".to_string()))?;
        let namespace = obj.metadata.namespace.clone();

        // resourceVersion travels with the object, so a stale copy gets a 409
        let api = self.api(&kind.api_resource(), namespace.as_deref());
        api.replace(&name, &PostParams::default(), &obj).await?;
        Ok(())
    }

    async fn list_events(
        &self,
        namespace: Option<String>,
        filter: &EventFilter,
    ) -> Result<Vec<ClusterEvent>, ClientError> {
        let ar = ApiResource::erase::<Event>(&());
        let api = self.api(&ar, namespace.as_deref());
        let list = api.list(&ListParams::default()).await?;

        let mut events = Vec::with_capacity(list.items.len());
        for obj in &list.items {
            let event = ClusterEvent::from_value(&serde_json::to_value(obj)?);
            if filter.matches(&event) {
                events.push(event);
            }
        }
        Ok(events)
    }
}
