use serde::Deserialize;
use thiserror::Error;

/// How a failure is surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// No session, or the server rejected it. Ends the session.
    Auth,
    /// Network failure or an unexpected response. Shown as degraded data.
    Transport,
    /// A state-changing call was refused by the server.
    Action,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Not logged in")]
    NoSession,

    #[error("Unauthorized - session expired or was rejected")]
    Unauthorized,

    #[error("Login failed: {0}")]
    LoginRejected(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    ActionRejected(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shape returned by the backend (`{"detail": "..."}`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let cut = (0..=MAX_ERROR_BODY_LENGTH)
                .rev()
                .find(|&i| body.is_char_boundary(i))
                .unwrap_or(0);
            format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
        }
    }

    /// Extract the server-provided `detail` message, if the body carries one.
    pub fn detail_message(body: &str) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(body).ok()?;
        match parsed.detail? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
            _ => None,
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let message = Self::detail_message(body).unwrap_or_else(|| Self::truncate_body(body));
        match status {
            401 => ApiError::Unauthorized,
            404 => ApiError::NotFound(message),
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::NoSession | ApiError::Unauthorized | ApiError::LoginRejected(_) => {
                ErrorClass::Auth
            }
            ApiError::ActionRejected(_) => ErrorClass::Action,
            _ => ErrorClass::Transport,
        }
    }

    pub fn is_auth(&self) -> bool {
        self.class() == ErrorClass::Auth
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::InvalidResponse(e.to_string())
        } else {
            ApiError::NetworkError(e.to_string())
        }
    }
}
