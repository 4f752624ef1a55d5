//! Synchronization engine: cache-or-fetch decisions, user actions, and
//! the periodic scheduler that drives them.
//!
//! - `ResourceSynchronizer`: reads one resource for one server
//! - `ActionCoordinator`: start/shutdown with a deferred forced refresh
//! - `Scheduler`: hourly status and five-minute action-log cadences
//! - `DashboardView`: where results are handed to the front end

pub mod actions;
pub mod scheduler;
pub mod synchronizer;
pub mod view;

pub use actions::{ActionCoordinator, ActionOutcome, Confirm};
pub use scheduler::Scheduler;
pub use synchronizer::{ResourceData, ResourceSynchronizer};
pub use view::{DashboardView, DataSource, NullView};
