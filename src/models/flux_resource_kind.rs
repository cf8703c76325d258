//! Flux Resource Kind definitions
//!
//! This module provides the single enum for the Flux CRD kinds the fleet
//! manager observes. Everything that differs per kind (API coordinates,
//! field extraction, the suspend flag location) hangs off this type, so
//! adding a kind is a change in one place.

use std::fmt;
use std::str::FromStr;

use kube::core::ApiResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ManagerError;
use crate::models::resource::{Resource, SourceRef};

/// Annotation Flux controllers watch for on-demand reconciliation
pub const RECONCILE_REQUESTED_ANNOTATION: &str = "reconcile.fluxcd.io/requestedAt";

/// Enumeration of the observed Flux CRD kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FluxResourceKind {
    // Source Controller resources
    GitRepository,
    HelmRepository,
    // Kustomize Controller resources
    Kustomization,
    // Helm Controller resources
    HelmRelease,
}

impl FluxResourceKind {
    /// Get the display name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            FluxResourceKind::GitRepository => "GitRepository",
            FluxResourceKind::HelmRepository => "HelmRepository",
            FluxResourceKind::Kustomization => "Kustomization",
            FluxResourceKind::HelmRelease => "HelmRelease",
        }
    }

    /// Try to parse a string into a FluxResourceKind, returning None if invalid
    pub fn parse_optional(s: &str) -> Option<Self> {
        s.parse().ok()
    }

    /// All kinds, in the order a refresh worker lists them
    pub fn all() -> &'static [Self] {
        &[
            FluxResourceKind::GitRepository,
            FluxResourceKind::HelmRepository,
            FluxResourceKind::Kustomization,
            FluxResourceKind::HelmRelease,
        ]
    }

    /// Try to parse a string (case-insensitive, aliases allowed) into a FluxResourceKind
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gitrepository" | "gitrepo" | "gitrepositories" => {
                Some(FluxResourceKind::GitRepository)
            }
            "helmrepository" | "helmrepo" | "helmrepositories" => {
                Some(FluxResourceKind::HelmRepository)
            }
            "kustomization" | "ks" | "kustomizations" => Some(FluxResourceKind::Kustomization),
            "helmrelease" | "hr" | "helmreleases" => Some(FluxResourceKind::HelmRelease),
            _ => None,
        }
    }

    /// API group serving this kind
    pub fn api_group(&self) -> &'static str {
        match self {
            FluxResourceKind::GitRepository | FluxResourceKind::HelmRepository => {
                "source.toolkit.fluxcd.io"
            }
            FluxResourceKind::Kustomization => "kustomize.toolkit.fluxcd.io",
            FluxResourceKind::HelmRelease => "helm.toolkit.fluxcd.io",
        }
    }

    /// Served API version
    pub fn api_version(&self) -> &'static str {
        match self {
            FluxResourceKind::HelmRelease => "v2",
            _ => "v1",
        }
    }

    /// Plural resource name used in API paths
    pub fn plural(&self) -> &'static str {
        match self {
            FluxResourceKind::GitRepository => "gitrepositories",
            FluxResourceKind::HelmRepository => "helmrepositories",
            FluxResourceKind::Kustomization => "kustomizations",
            FluxResourceKind::HelmRelease => "helmreleases",
        }
    }

    /// Dynamic API descriptor for `Api<DynamicObject>`
    pub fn api_resource(&self) -> ApiResource {
        let group = self.api_group();
        let version = self.api_version();
        ApiResource {
            group: group.to_string(),
            version: version.to_string(),
            api_version: format!("{}/{}", group, version),
            kind: self.as_str().to_string(),
            plural: self.plural().to_string(),
        }
    }

    /// JSON path of the suspend flag. Identical for every kind today.
    pub fn suspend_path(&self) -> &'static [&'static str] {
        &["spec", "suspend"]
    }

    /// Set the suspend flag on a raw object, creating `spec` if needed.
    ///
    /// Returns false when the object is not a JSON object.
    pub fn set_suspended(&self, obj: &mut Value, suspend: bool) -> bool {
        let (leaf, parents) = match self.suspend_path().split_last() {
            Some(split) => split,
            None => return false,
        };

        let mut cursor = obj;
        for segment in parents {
            let Some(map) = cursor.as_object_mut() else {
                return false;
            };
            cursor = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
        }

        match cursor.as_object_mut() {
            Some(map) => {
                map.insert(leaf.to_string(), Value::Bool(suspend));
                true
            }
            None => false,
        }
    }

    /// Read the suspend flag from a raw object (missing means not suspended)
    pub fn is_suspended(&self, obj: &Value) -> bool {
        self.suspend_path()
            .iter()
            .try_fold(obj, |v, segment| v.get(*segment))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Overwrite the reconcile-request annotation on a raw object
    ///
    /// Flux controllers reconcile again whenever this value changes.
    pub fn set_reconcile_requested(&self, obj: &mut Value, requested_at: &str) -> bool {
        let Some(root) = obj.as_object_mut() else {
            return false;
        };
        let metadata = root
            .entry("metadata")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        let Some(metadata) = metadata.as_object_mut() else {
            return false;
        };
        let annotations = metadata
            .entry("annotations")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if annotations.is_null() {
            *annotations = Value::Object(serde_json::Map::new());
        }
        match annotations.as_object_mut() {
            Some(map) => {
                map.insert(
                    RECONCILE_REQUESTED_ANNOTATION.to_string(),
                    Value::String(requested_at.to_string()),
                );
                true
            }
            None => false,
        }
    }

    /// Current value of the reconcile-request annotation
    pub fn reconcile_requested_at<'a>(&self, obj: &'a Value) -> Option<&'a str> {
        obj.get("metadata")?
            .get("annotations")?
            .get(RECONCILE_REQUESTED_ANNOTATION)?
            .as_str()
    }

    /// Whether an involved object's `kind` and `apiVersion` refer to this kind
    pub fn matches_object(&self, kind: &str, api_version: &str) -> bool {
        if kind != self.as_str() {
            return false;
        }
        // Events may reference any served version of the group
        api_version.is_empty()
            || api_version
                .split_once('/')
                .is_some_and(|(group, _)| group == self.api_group())
    }

    /// Copy the kind-specific fields of a raw object into a normalized resource.
    ///
    /// Missing or mistyped fields are left as `None`.
    pub fn extract_fields(&self, obj: &Value, resource: &mut Resource) {
        let spec = obj.get("spec");
        let status = obj.get("status");

        match self {
            FluxResourceKind::GitRepository | FluxResourceKind::HelmRepository => {
                resource.url = str_at(spec, &["url"]);
                resource.revision = str_at(status, &["artifact", "revision"]);
            }
            FluxResourceKind::Kustomization => {
                resource.path = str_at(spec, &["path"]);
                resource.source_ref = spec
                    .and_then(|s| s.get("sourceRef"))
                    .and_then(SourceRef::from_value);
                resource.revision = str_at(status, &["lastAppliedRevision"]);
            }
            FluxResourceKind::HelmRelease => {
                let chart_spec = spec.and_then(|s| s.get("chart")).and_then(|c| c.get("spec"));
                resource.chart = str_at(chart_spec, &["chart"]);
                resource.chart_version = str_at(chart_spec, &["version"]);
                // OCI-backed releases point at their chart source through spec.chartRef
                resource.source_ref = chart_spec
                    .and_then(|c| c.get("sourceRef"))
                    .and_then(SourceRef::from_value)
                    .or_else(|| {
                        spec.and_then(|s| s.get("chartRef"))
                            .and_then(SourceRef::from_value)
                    });
                resource.revision = str_at(status, &["lastAppliedRevision"])
                    .or_else(|| str_at(status, &["lastAttemptedRevision"]));
            }
        }
    }
}

/// Walk `path` below `root` and return a non-empty string leaf
fn str_at(root: Option<&Value>, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(root?, |v, segment| v.get(*segment))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl fmt::Display for FluxResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl From<FluxResourceKind> for String {
    fn from(kind: FluxResourceKind) -> Self {
        kind.as_str().to_string()
    }
}

impl FromStr for FluxResourceKind {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GitRepository" => Ok(FluxResourceKind::GitRepository),
            "HelmRepository" => Ok(FluxResourceKind::HelmRepository),
            "Kustomization" => Ok(FluxResourceKind::Kustomization),
            "HelmRelease" => Ok(FluxResourceKind::HelmRelease),
            _ => Err(ManagerError::UnsupportedKind(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_as_str() {
        assert_eq!(FluxResourceKind::GitRepository.as_str(), "GitRepository");
        assert_eq!(FluxResourceKind::Kustomization.as_str(), "Kustomization");
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            FluxResourceKind::parse_optional("HelmRelease"),
            Some(FluxResourceKind::HelmRelease)
        );
        assert_eq!(FluxResourceKind::parse_optional("OCIRepository"), None);
        assert!(matches!(
            "Bucket".parse::<FluxResourceKind>(),
            Err(ManagerError::UnsupportedKind(kind)) if kind == "Bucket"
        ));
    }

    #[test]
    fn test_from_str_case_insensitive() {
        assert_eq!(
            FluxResourceKind::from_str_case_insensitive("ks"),
            Some(FluxResourceKind::Kustomization)
        );
        assert_eq!(
            FluxResourceKind::from_str_case_insensitive("HelmRepo"),
            Some(FluxResourceKind::HelmRepository)
        );
        assert_eq!(FluxResourceKind::from_str_case_insensitive("oci"), None);
    }

    #[test]
    fn test_all_order() {
        assert_eq!(
            FluxResourceKind::all(),
            &[
                FluxResourceKind::GitRepository,
                FluxResourceKind::HelmRepository,
                FluxResourceKind::Kustomization,
                FluxResourceKind::HelmRelease,
            ]
        );
    }

    #[test]
    fn test_api_resource() {
        let ar = FluxResourceKind::HelmRelease.api_resource();
        assert_eq!(ar.api_version, "helm.toolkit.fluxcd.io/v2");
        assert_eq!(ar.plural, "helmreleases");
        assert_eq!(ar.kind, "HelmRelease");

        let ar = FluxResourceKind::HelmRepository.api_resource();
        assert_eq!(ar.group, "source.toolkit.fluxcd.io");
    }

    #[test]
    fn test_set_suspended_creates_spec() {
        let mut obj = json!({"metadata": {"name": "app"}});
        assert!(FluxResourceKind::Kustomization.set_suspended(&mut obj, true));
        assert_eq!(obj["spec"]["suspend"], json!(true));
        assert!(FluxResourceKind::Kustomization.is_suspended(&obj));

        assert!(FluxResourceKind::Kustomization.set_suspended(&mut obj, false));
        assert!(!FluxResourceKind::Kustomization.is_suspended(&obj));
    }

    #[test]
    fn test_set_suspended_rejects_non_object() {
        let mut obj = json!("not an object");
        assert!(!FluxResourceKind::GitRepository.set_suspended(&mut obj, true));
    }

    #[test]
    fn test_set_reconcile_requested_overwrites() {
        let kind = FluxResourceKind::HelmRelease;
        let mut obj = json!({"metadata": {"name": "podinfo", "annotations": null}});
        assert!(kind.set_reconcile_requested(&mut obj, "2024-05-01T10:00:00.000000001Z"));
        assert!(kind.set_reconcile_requested(&mut obj, "2024-05-01T10:00:00.000000002Z"));
        assert_eq!(
            kind.reconcile_requested_at(&obj),
            Some("2024-05-01T10:00:00.000000002Z")
        );
        assert_eq!(kind.reconcile_requested_at(&json!({})), None);
    }

    #[test]
    fn test_matches_object() {
        let kind = FluxResourceKind::Kustomization;
        assert!(kind.matches_object("Kustomization", "kustomize.toolkit.fluxcd.io/v1"));
        assert!(kind.matches_object("Kustomization", "kustomize.toolkit.fluxcd.io/v1beta2"));
        assert!(!kind.matches_object("Kustomization", "kustomize.config.k8s.io/v1beta1"));
        assert!(!kind.matches_object("HelmRelease", "helm.toolkit.fluxcd.io/v2"));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", FluxResourceKind::HelmRelease), "HelmRelease");
        let s: String = FluxResourceKind::GitRepository.into();
        assert_eq!(s, "GitRepository");
    }
}
