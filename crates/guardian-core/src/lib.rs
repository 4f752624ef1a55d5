//! Guardian Core - Shared library for the GCP Guardian dashboard.
//!
//! This crate keeps a local view of the monitored VMs (power state, egress
//! traffic, action history) in sync with the Guardian backend:
//! - Bearer-token session that ends on the first `401`
//! - Per-server resource cache with per-kind freshness
//! - Hourly status and five-minute action-log refresh
//! - Start/shutdown actions followed by a deferred forced refresh
//!
//! `Dashboard` wires the pieces together; front ends implement
//! `DashboardView` to receive results.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod models;
pub mod sync;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types at crate root
pub use api::{ApiClient, ApiError, ErrorClass, HttpBackend, ReqwestBackend};
pub use auth::{SessionData, SessionGuard, SessionState};
pub use cache::{CacheKey, ResourceCache, ResourceKind};
pub use config::{Config, SyncPolicy};
pub use dashboard::Dashboard;
pub use models::{ActionLogEntry, DashboardStatus, Server, VmAction, VmState};
pub use sync::{
    ActionCoordinator, ActionOutcome, Confirm, DashboardView, DataSource, NullView, ResourceData,
    ResourceSynchronizer, Scheduler,
};
