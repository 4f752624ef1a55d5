use std::fmt;

use serde::{Deserialize, Serialize};

/// Power state reported by the backend.
///
/// Anything other than `RUNNING` or `TERMINATED` keeps its raw string so it
/// survives a trip through the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VmState {
    Running,
    Terminated,
    Other(String),
}

impl VmState {
    pub fn as_str(&self) -> &str {
        match self {
            VmState::Running => "RUNNING",
            VmState::Terminated => "TERMINATED",
            VmState::Other(raw) => raw,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, VmState::Running)
    }
}

impl From<String> for VmState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "RUNNING" => VmState::Running,
            "TERMINATED" => VmState::Terminated,
            _ => VmState::Other(raw),
        }
    }
}

impl From<VmState> for String {
    fn from(state: VmState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response of `/api/v1/servers/{id}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    pub instance_name: String,
    pub status: VmState,
    pub current_traffic_gb: f64,
    pub traffic_threshold_gb: f64,
    pub traffic_usage_percent: f64,
}

impl DashboardStatus {
    pub fn over_threshold(&self) -> bool {
        self.current_traffic_gb > self.traffic_threshold_gb
    }
}
