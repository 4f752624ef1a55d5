use serde::{Deserialize, Serialize};

/// A monitored VM as listed by `/api/v1/servers`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
}

impl Server {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Match a user-supplied reference against the id, then the name.
    pub fn matches(&self, reference: &str) -> bool {
        self.id == reference || self.name.eq_ignore_ascii_case(reference)
    }
}
