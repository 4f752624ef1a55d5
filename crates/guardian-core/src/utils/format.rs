use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::models::{ActionLogEntry, DashboardStatus};

/// Placeholder line shown instead of an empty action history
pub const NO_ACTIONS_PLACEHOLDER: &str = "No actions recorded";

/// Maximum displayed length of an action reason
const MAX_REASON_LENGTH: usize = 60;

/// Bytes left as-is in a path segment: ASCII alphanumerics, `-` and `_`
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

/// Percent-encode everything outside `[A-Za-z0-9_-]`.
/// The result is safe as a URL path segment.
pub fn encode_segment(raw: &str) -> String {
    utf8_percent_encode(raw, SEGMENT).to_string()
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format traffic in GB with precision that suits its size
pub fn format_traffic(gb: f64) -> String {
    if gb < 10.0 {
        format!("{:.2} GB", gb)
    } else {
        format!("{:.1} GB", gb)
    }
}

/// One-line summary of a status: `vm-1  RUNNING  1.50 GB / 100.0 GB (1.5%)`
pub fn format_status_line(status: &DashboardStatus) -> String {
    format!(
        "{}  {}  {} / {} ({:.1}%)",
        status.instance_name,
        status.status,
        format_traffic(status.current_traffic_gb),
        format_traffic(status.traffic_threshold_gb),
        status.traffic_usage_percent
    )
}

/// Lines for an action history. An empty history is a single placeholder line.
pub fn format_action_log(entries: &[ActionLogEntry]) -> Vec<String> {
    if entries.is_empty() {
        return vec![NO_ACTIONS_PLACEHOLDER.to_string()];
    }

    entries
        .iter()
        .map(|entry| {
            let when = entry.timestamp.format("%Y-%m-%d %H:%M:%S");
            match entry.reason.as_deref().filter(|r| !r.is_empty()) {
                Some(reason) => format!(
                    "{}  {}  {}",
                    when,
                    entry.action_type,
                    truncate_string(reason, MAX_REASON_LENGTH)
                ),
                None => format!("{}  {}", when, entry.action_type),
            }
        })
        .collect()
}
