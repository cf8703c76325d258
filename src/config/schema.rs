//! Configuration schema definitions
//!
//! Defines the structure of configuration files using serde for serialization.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults;
use crate::kube::ClusterTarget;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Additional clusters connected beside the default one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<ClusterConfig>,

    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub logger: LoggerConfig,

    /// Kubeconfig for the default cluster (runtime only)
    #[serde(skip)]
    pub current_kubeconfig: Option<PathBuf>,

    /// Context for the default cluster (runtime only)
    #[serde(skip)]
    pub current_context: Option<String>,

    /// Namespace override (runtime only)
    #[serde(skip)]
    pub current_namespace: Option<String>,
}

/// One additionally configured cluster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ClusterConfig {
    pub fn target(&self) -> ClusterTarget {
        ClusterTarget {
            name: self.name.clone(),
            kubeconfig: self.kubeconfig.clone(),
            context: self.context.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

/// Fleet-wide behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DefaultsConfig {
    /// Starting namespace; empty or `all` watches every namespace
    #[serde(default = "defaults::namespace")]
    pub namespace: String,

    #[serde(default = "defaults::refresh_interval", with = "duration_format")]
    pub refresh_interval: Duration,

    /// Clusters refreshed at the same time
    #[serde(default = "defaults::max_concurrent_clusters")]
    pub max_concurrent_clusters: usize,

    #[serde(default = "defaults::events_enabled")]
    pub events_enabled: bool,
}

/// Logger configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoggerConfig {
    /// Level used when neither RUST_LOG nor --log-level is given
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clusters: Vec::new(),
            defaults: DefaultsConfig::default(),
            logger: LoggerConfig::default(),
            current_kubeconfig: None,
            current_context: None,
            current_namespace: None,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            namespace: defaults::namespace(),
            refresh_interval: defaults::refresh_interval(),
            max_concurrent_clusters: defaults::max_concurrent_clusters(),
            events_enabled: defaults::events_enabled(),
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

impl Config {
    /// Namespace scope in effect; `None` means all namespaces
    pub fn effective_namespace(&self) -> Option<String> {
        let namespace = self
            .current_namespace
            .as_deref()
            .unwrap_or(&self.defaults.namespace);
        match namespace {
            "" | "all" | "-A" => None,
            ns => Some(ns.to_string()),
        }
    }

    pub fn cluster(&self, name: &str) -> Option<&ClusterConfig> {
        self.clusters.iter().find(|c| c.name == name)
    }

    /// Add a cluster, replacing any entry with the same name
    pub fn add_cluster(&mut self, cluster: ClusterConfig) {
        match self.clusters.iter_mut().find(|c| c.name == cluster.name) {
            Some(existing) => *existing = cluster,
            None => self.clusters.push(cluster),
        }
    }

    /// Returns whether an entry was removed
    pub fn remove_cluster(&mut self, name: &str) -> bool {
        let before = self.clusters.len();
        self.clusters.retain(|c| c.name != name);
        self.clusters.len() != before
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.defaults.max_concurrent_clusters == 0 {
            anyhow::bail!("defaults.maxConcurrentClusters must be at least 1");
        }
        if self.defaults.refresh_interval.is_zero() {
            anyhow::bail!("defaults.refreshInterval must be greater than zero");
        }

        let mut seen = std::collections::HashSet::new();
        for cluster in &self.clusters {
            if cluster.name.trim().is_empty() {
                anyhow::bail!("clusters: every entry needs a name");
            }
            if !seen.insert(cluster.name.as_str()) {
                anyhow::bail!("clusters: duplicate name '{}'", cluster.name);
            }
        }
        Ok(())
    }
}

/// `"500ms"`, `"5s"`, `"2m"`, `"1h"` and sums like `"1m30s"`
pub mod duration_format {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn parse(input: &str) -> Result<Duration, String> {
        let input = input.trim();
        if input.is_empty() {
            return Err("empty duration".to_string());
        }

        let mut total = Duration::ZERO;
        let mut rest = input;
        while !rest.is_empty() {
            let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            if digits == 0 {
                return Err(format!("invalid duration '{}'", input));
            }
            let value: u64 = rest[..digits]
                .parse()
                .map_err(|_| format!("invalid duration '{}'", input))?;
            rest = &rest[digits..];

            let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
            let part = match &rest[..unit_len] {
                "ms" => Duration::from_millis(value),
                "s" => Duration::from_secs(value),
                "m" => Duration::from_secs(value * 60),
                "h" => Duration::from_secs(value * 3600),
                "" => return Err(format!("missing unit in duration '{}'", input)),
                unit => return Err(format!("unknown unit '{}' in duration '{}'", unit, input)),
            };
            total += part;
            rest = &rest[unit_len..];
        }
        Ok(total)
    }

    pub fn format(duration: Duration) -> String {
        let millis = duration.as_millis();
        if millis == 0 {
            "0s".to_string()
        } else if millis % 3_600_000 == 0 {
            format!("{}h", millis / 3_600_000)
        } else if millis % 60_000 == 0 {
            format!("{}m", millis / 60_000)
        } else if millis % 1000 == 0 {
            format!("{}s", millis / 1000)
        } else {
            format!("{}ms", millis)
        }
    }

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(de::Error::custom)
    }
}
