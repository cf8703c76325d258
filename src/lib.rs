//! fluxfleet library
//!
//! Aggregates Flux GitOps resources across several Kubernetes clusters,
//! normalizes their status, refreshes it in the background and offers
//! suspend/resume/reconcile. The binary is a thin CLI over [`FleetManager`].

pub mod cli;
pub mod config;
pub mod error;
pub mod kube;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use error::{ManagerError, ManagerResult};
pub use models::{FluxResourceKind, Resource, normalize};
pub use services::{FleetManager, Update, UpdateSubscriber};
pub use state::FleetState;
