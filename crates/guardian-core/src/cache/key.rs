use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

/// Bytes escaped in cache file names. Uppercase letters are escaped too so
/// ids differing only in case stay apart on case-insensitive filesystems.
const FILE_NAME: &AsciiSet = &file_name_set();

const fn file_name_set() -> AsciiSet {
    let mut set = NON_ALPHANUMERIC.remove(b'-').remove(b'_');
    let mut byte = b'A';
    while byte <= b'Z' {
        set = set.add(byte);
        byte += 1;
    }
    set
}

/// Category of data held for a server. Each kind has its own TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Power state and egress traffic.
    Status,
    /// Start/shutdown history.
    ActionLogs,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Status => "status",
            ResourceKind::ActionLogs => "action_logs",
        }
    }

    /// Whether a fresh cached value may be returned instead of fetching.
    /// Action logs are always fetched.
    pub fn cache_served(&self) -> bool {
        matches!(self, ResourceKind::Status)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub server_id: String,
    pub kind: ResourceKind,
}

impl CacheKey {
    pub fn new(server_id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            server_id: server_id.into(),
            kind,
        }
    }

    /// File-safe name; distinct keys never map to the same name, even
    /// when compared case-insensitively.
    pub fn file_name(&self) -> String {
        format!(
            "{}.{}.json",
            utf8_percent_encode(&self.server_id, FILE_NAME),
            self.kind.as_str()
        )
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.server_id, self.kind)
    }
}
