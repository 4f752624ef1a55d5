use crate::api::ApiError;
use crate::auth::SessionState;
use crate::cache::ResourceKind;
use crate::models::{ActionLogEntry, DashboardStatus, Server, VmAction};

use super::ResourceData;

/// Where a rendered value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Cache,
    Network,
}

/// Observer the engine hands plain data to. Front ends implement the
/// methods they care about; the rest default to doing nothing.
pub trait DashboardView: Send + Sync {
    fn status_updated(&self, _server: &Server, _status: &DashboardStatus, _source: DataSource) {}

    fn action_logs_updated(&self, _server: &Server, _entries: &[ActionLogEntry]) {}

    /// A refresh failed. `stale` is the last cached value, if any.
    fn degraded(
        &self,
        _server: &Server,
        _kind: ResourceKind,
        _stale: Option<&ResourceData>,
        _error: &ApiError,
    ) {
    }

    fn action_finished(&self, _server: &Server, _action: VmAction, _message: &str, _success: bool) {}

    /// The session ended while the scheduler was running.
    fn session_ended(&self, _state: SessionState) {}
}

/// View that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullView;

impl DashboardView for NullView {}
