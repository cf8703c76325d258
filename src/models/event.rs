//! Cluster lifecycle events involving Flux objects

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::FluxResourceKind;
use super::resource::parse_timestamp;

/// A core/v1 Event, reduced to what the fleet view displays
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterEvent {
    /// "Normal" or "Warning"
    pub type_: String,
    pub reason: String,
    pub message: String,
    pub involved_kind: String,
    pub involved_name: String,
    pub involved_namespace: String,
    pub involved_api_version: String,
    pub count: u32,
    pub last_seen: Option<DateTime<Utc>>,
}

impl ClusterEvent {
    /// Build from the JSON form of a core/v1 Event
    pub fn from_value(value: &Value) -> Self {
        let text = |root: Option<&Value>, key: &str| {
            root.and_then(|v| v.get(key))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let involved = value.get("involvedObject");

        // lastTimestamp is empty for events written through events.k8s.io
        let last_seen = ["lastTimestamp", "eventTime", "firstTimestamp"]
            .iter()
            .filter_map(|key| value.get(*key).and_then(Value::as_str))
            .find_map(parse_timestamp)
            .or_else(|| {
                value
                    .get("metadata")
                    .and_then(|m| m.get("creationTimestamp"))
                    .and_then(Value::as_str)
                    .and_then(parse_timestamp)
            });

        Self {
            type_: text(Some(value), "type"),
            reason: text(Some(value), "reason"),
            message: text(Some(value), "message"),
            involved_kind: text(involved, "kind"),
            involved_name: text(involved, "name"),
            involved_namespace: text(involved, "namespace"),
            involved_api_version: text(involved, "apiVersion"),
            count: value
                .get("count")
                .and_then(Value::as_u64)
                .and_then(|c| u32::try_from(c).ok())
                .unwrap_or(1),
            last_seen,
        }
    }

    /// `Kind/namespace/name` of the involved object
    pub fn object_ref(&self) -> String {
        format!(
            "{}/{}/{}",
            self.involved_kind, self.involved_namespace, self.involved_name
        )
    }

    pub fn is_warning(&self) -> bool {
        self.type_ == "Warning"
    }
}

/// Which involved objects an event listing keeps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub kinds: Vec<FluxResourceKind>,
}

impl EventFilter {
    /// Events about any observed Flux kind
    pub fn flux() -> Self {
        Self {
            kinds: FluxResourceKind::all().to_vec(),
        }
    }

    pub fn matches(&self, event: &ClusterEvent) -> bool {
        self.kinds
            .iter()
            .any(|k| k.matches_object(&event.involved_kind, &event.involved_api_version))
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::flux()
    }
}
