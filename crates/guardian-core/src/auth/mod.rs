//! Authentication module for managing the dashboard session.
//!
//! This module provides:
//! - `SessionGuard`: owns the bearer token and publishes its lifecycle
//! - `SessionFile`: persistence of the session across runs
//!
//! A session ends on logout or on the first `401` from the backend.

pub mod session;

pub use session::{SessionData, SessionFile, SessionGuard, SessionState};
