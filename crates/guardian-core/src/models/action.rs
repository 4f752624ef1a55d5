use std::fmt;

use serde::{Deserialize, Serialize};

/// State-changing operations a user can request for a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmAction {
    Start,
    Shutdown,
}

impl VmAction {
    /// Last path segment of the action endpoint.
    pub fn endpoint(&self) -> &'static str {
        match self {
            VmAction::Start => "start",
            VmAction::Shutdown => "shutdown",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VmAction::Start => "Start",
            VmAction::Shutdown => "Shut down",
        }
    }
}

impl fmt::Display for VmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// Body returned by the action endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub message: Option<String>,
}
