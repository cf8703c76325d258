//! Fleet model layer
//!
//! Structure:
//! - `flux_resource_kind.rs` - the observed kinds and everything that differs per kind
//! - `resource.rs` - canonical `Resource`/`Condition` snapshot types
//! - `normalize.rs` - raw object to `Resource` mapping
//! - `event.rs` - cluster events and the event filter

pub mod event;
pub mod flux_resource_kind;
pub mod normalize;
pub mod resource;

pub use event::{ClusterEvent, EventFilter};
pub use flux_resource_kind::{FluxResourceKind, RECONCILE_REQUESTED_ANNOTATION};
pub use normalize::{normalize, normalize_list};
pub use resource::{Condition, Resource, SourceRef, format_age};
