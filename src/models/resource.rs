//! Canonical resource snapshot
//!
//! Every Flux kind is normalized into [`Resource`] so consumers only ever
//! deal with one shape, whatever the CRD's status layout looks like.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::FluxResourceKind;

/// Condition type carrying the readiness summary
pub const READY_CONDITION: &str = "Ready";

/// A status condition, copied verbatim from the raw object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    /// "True", "False" or "Unknown"
    pub status: String,
    pub reason: String,
    pub message: String,
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Build a condition from its JSON form. Missing fields become empty.
    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            type_: text("type"),
            status: text("status"),
            reason: text("reason"),
            message: text("message"),
            last_transition_time: value
                .get("lastTransitionTime")
                .and_then(Value::as_str)
                .and_then(parse_timestamp),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

/// Soft reference to another object, resolved by the consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl SourceRef {
    pub fn from_value(value: &Value) -> Option<Self> {
        let name = value.get("name").and_then(Value::as_str)?;
        if name.is_empty() {
            return None;
        }
        Some(Self {
            kind: value
                .get("kind")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            name: name.to_string(),
            namespace: value
                .get("namespace")
                .and_then(Value::as_str)
                .filter(|ns| !ns.is_empty())
                .map(str::to_string),
        })
    }
}

/// Normalized snapshot of one Flux object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub kind: FluxResourceKind,
    pub name: String,
    pub namespace: String,
    pub ready: bool,
    /// Reason of the Ready condition
    pub status_summary: String,
    /// Message of the Ready condition
    pub message: String,
    /// Age at `last_update`, never carried over between refreshes
    #[serde(skip)]
    pub age: TimeDelta,
    pub created_at: Option<DateTime<Utc>>,
    /// Snapshot time of the refresh that produced this value
    pub last_update: DateTime<Utc>,
    pub conditions: Vec<Condition>,
    pub suspended: bool,

    // Kind-specific fields
    pub url: Option<String>,
    pub path: Option<String>,
    pub source_ref: Option<SourceRef>,
    pub chart: Option<String>,
    pub chart_version: Option<String>,
    /// Last applied revision for Kustomization/HelmRelease, artifact revision for repositories
    pub revision: Option<String>,
}

impl Resource {
    /// Empty resource of the given kind, stamped with the snapshot time
    pub fn empty(kind: FluxResourceKind, snapshot_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            name: String::new(),
            namespace: String::new(),
            ready: false,
            status_summary: String::new(),
            message: String::new(),
            age: TimeDelta::zero(),
            created_at: None,
            last_update: snapshot_at,
            conditions: Vec::new(),
            suspended: false,
            url: None,
            path: None,
            source_ref: None,
            chart: None,
            chart_version: None,
            revision: None,
        }
    }

    /// The Ready condition the summary fields were derived from, if any
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.conditions
            .iter()
            .rev()
            .find(|c| c.type_ == READY_CONDITION)
    }

    /// `namespace/name`
    pub fn namespaced_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Parse an RFC 3339 timestamp as written by the API server
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Render an age the way kubectl does (`45s`, `12m`, `3h`, `5d`)
pub fn format_age(age: TimeDelta) -> String {
    let secs = age.num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_condition_from_value() {
        let cond = Condition::from_value(&json!({
            "type": "Ready",
            "status": "True",
            "reason": "Succeeded",
            "message": "Applied revision: main@sha1:abc",
            "lastTransitionTime": "2024-01-01T12:00:00Z"
        }));
        assert_eq!(cond.type_, "Ready");
        assert!(cond.is_true());
        assert_eq!(cond.reason, "Succeeded");
        assert_eq!(
            cond.last_transition_time,
            parse_timestamp("2024-01-01T12:00:00Z")
        );
    }

    #[test]
    fn test_condition_from_partial_value() {
        let cond = Condition::from_value(&json!({"type": "Ready", "status": 3}));
        assert_eq!(cond.status, "");
        assert!(!cond.is_true());
        assert!(cond.last_transition_time.is_none());
    }

    #[test]
    fn test_source_ref_requires_name() {
        assert!(SourceRef::from_value(&json!({"kind": "GitRepository"})).is_none());
        let sr = SourceRef::from_value(&json!({
            "kind": "GitRepository",
            "name": "flux-system",
            "namespace": ""
        }))
        .unwrap();
        assert_eq!(sr.name, "flux-system");
        assert_eq!(sr.namespace, None);
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(TimeDelta::seconds(42)), "42s");
        assert_eq!(format_age(TimeDelta::seconds(150)), "2m");
        assert_eq!(format_age(TimeDelta::hours(5)), "5h");
        assert_eq!(format_age(TimeDelta::days(3)), "3d");
        assert_eq!(format_age(TimeDelta::seconds(-5)), "0s");
    }
}
