//! Raw object → [`Resource`] normalization
//!
//! Pure functions: the snapshot time is an argument, nothing is cached, and
//! malformed input degrades to empty fields instead of failing.

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use super::resource::{Condition, READY_CONDITION, Resource, parse_timestamp};
use super::FluxResourceKind;

/// Normalize one raw Flux object of a known kind
pub fn normalize(kind: FluxResourceKind, raw: &Value, snapshot_at: DateTime<Utc>) -> Resource {
    let mut resource = Resource::empty(kind, snapshot_at);

    let metadata = raw.get("metadata");
    let meta_str = |key: &str| {
        metadata
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    resource.name = meta_str("name");
    resource.namespace = meta_str("namespace");

    resource.created_at = metadata
        .and_then(|m| m.get("creationTimestamp"))
        .and_then(Value::as_str)
        .and_then(parse_timestamp);
    resource.age = resource
        .created_at
        .map(|created| (snapshot_at - created).max(TimeDelta::zero()))
        .unwrap_or_else(TimeDelta::zero);

    resource.suspended = kind.is_suspended(raw);

    resource.conditions = raw
        .get("status")
        .and_then(|s| s.get("conditions"))
        .and_then(Value::as_array)
        .map(|conds| conds.iter().map(Condition::from_value).collect())
        .unwrap_or_default();

    // Last Ready condition wins when several are present
    if let Some(ready) = resource
        .conditions
        .iter()
        .rev()
        .find(|c| c.type_ == READY_CONDITION)
    {
        resource.ready = ready.is_true();
        resource.status_summary = ready.reason.clone();
        resource.message = ready.message.clone();
    }

    kind.extract_fields(raw, &mut resource);
    resource
}

/// Normalize a listed batch with one shared snapshot time
pub fn normalize_list(
    kind: FluxResourceKind,
    items: &[Value],
    snapshot_at: DateTime<Utc>,
) -> Vec<Resource> {
    items
        .iter()
        .map(|item| normalize(kind, item, snapshot_at))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_normalize_ready_kustomization() {
        let raw = json!({
            "metadata": {
                "name": "apps",
                "namespace": "flux-system",
                "creationTimestamp": "2024-01-01T00:00:00Z"
            },
            "spec": {
                "path": "./clusters/prod",
                "sourceRef": {"kind": "GitRepository", "name": "flux-system"}
            },
            "status": {
                "lastAppliedRevision": "main@sha1:abc123",
                "conditions": [{
                    "type": "Ready",
                    "status": "True",
                    "reason": "ReconciliationSucceeded",
                    "message": "Applied revision: main@sha1:abc123"
                }]
            }
        });

        let r = normalize(
            FluxResourceKind::Kustomization,
            &raw,
            at("2024-01-01T01:00:00Z"),
        );
        assert_eq!(r.name, "apps");
        assert_eq!(r.namespace, "flux-system");
        assert!(r.ready);
        assert_eq!(r.status_summary, "ReconciliationSucceeded");
        assert_eq!(r.age, TimeDelta::hours(1));
        assert_eq!(r.path.as_deref(), Some("./clusters/prod"));
        assert_eq!(r.source_ref.unwrap().name, "flux-system");
        assert_eq!(r.revision.as_deref(), Some("main@sha1:abc123"));
        assert!(!r.suspended);
    }

    #[test]
    fn test_normalize_without_ready_condition() {
        let raw = json!({
            "metadata": {"name": "podinfo"},
            "status": {"conditions": [{"type": "Reconciling", "status": "True"}]}
        });
        let r = normalize(FluxResourceKind::HelmRelease, &raw, Utc::now());
        assert!(!r.ready);
        assert_eq!(r.status_summary, "");
        assert_eq!(r.conditions.len(), 1);
    }

    #[test]
    fn test_normalize_last_ready_wins() {
        let raw = json!({
            "status": {"conditions": [
                {"type": "Ready", "status": "True", "reason": "First"},
                {"type": "Ready", "status": "False", "reason": "Second", "message": "boom"}
            ]}
        });
        let r = normalize(FluxResourceKind::GitRepository, &raw, Utc::now());
        assert!(!r.ready);
        assert_eq!(r.status_summary, "Second");
        assert_eq!(r.message, "boom");
        assert_eq!(r.ready_condition().unwrap().reason, "Second");
    }

    #[test]
    fn test_normalize_garbage_degrades() {
        let now = Utc::now();
        let r = normalize(FluxResourceKind::HelmRepository, &json!(42), now);
        assert_eq!(r.name, "");
        assert!(!r.ready);
        assert!(r.conditions.is_empty());
        assert_eq!(r.age, TimeDelta::zero());
        assert_eq!(r.last_update, now);
    }

    #[test]
    fn test_future_creation_clamps_age() {
        let raw = json!({"metadata": {"creationTimestamp": "2030-01-01T00:00:00Z"}});
        let r = normalize(
            FluxResourceKind::GitRepository,
            &raw,
            at("2024-01-01T00:00:00Z"),
        );
        assert_eq!(r.age, TimeDelta::zero());
    }

    #[test]
    fn test_normalize_list_shares_snapshot() {
        let now = Utc::now();
        let items = vec![
            json!({"metadata": {"name": "a"}}),
            json!({"metadata": {"name": "b"}}),
        ];
        let resources = normalize_list(FluxResourceKind::GitRepository, &items, now);
        assert_eq!(resources.len(), 2);
        assert!(resources.iter().all(|r| r.last_update == now));
    }
}
