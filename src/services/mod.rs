//! Service layer: the multi-cluster fleet manager
//!
//! Structure:
//! - `connection_registry.rs` - named cluster connections and the active selection
//! - `refresh_engine.rs` - periodic, bounded fan-out of resource listings
//! - `event_engine.rs` - periodic event collection
//! - `mutation_service.rs` - suspend/resume/reconcile
//! - `update_bus.rs` / `shutdown.rs` - channels to the consumer and the stop signal
//! - `manager.rs` - `FleetManager`, which wires the above together

pub mod connection_registry;
pub mod event_engine;
pub mod manager;
pub mod mutation_service;
pub mod refresh_engine;
pub mod shutdown;
pub mod update_bus;

pub use connection_registry::{ClusterConnection, ConnectionRegistry};
pub use event_engine::EventEngine;
pub use manager::FleetManager;
pub use mutation_service::MutationService;
pub use refresh_engine::RefreshEngine;
pub use shutdown::Shutdown;
pub use update_bus::{
    ErrorUpdate, EventUpdate, Publisher, ResourceUpdate, Update, UpdateBus, UpdateSubscriber,
};
