//! Utility functions for string formatting and encoding.

pub mod format;

// Re-export commonly used functions at module level
pub use format::{
    encode_segment, format_action_log, format_status_line, format_traffic, truncate_string,
    NO_ACTIONS_PLACEHOLDER,
};
