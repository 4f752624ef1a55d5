//! Data models for the Guardian backend.
//!
//! - `Server`: a monitored VM
//! - `DashboardStatus`, `VmState`: power state and egress traffic
//! - `ActionLogEntry`: start/shutdown history
//! - `VmAction`: user-triggered operations

pub mod action;
pub mod action_log;
pub mod server;
pub mod status;

pub use action::{ActionResponse, VmAction};
pub use action_log::{normalize_action_log, ActionLogEntry, DEFAULT_ACTION_LOG_LIMIT};
pub use server::Server;
pub use status::{DashboardStatus, VmState};
