//! REST API client module for the Guardian backend.
//!
//! This module provides the `ApiClient` for the typed endpoints, the
//! `AuthenticatedTransport` that gates them on a live session, and the
//! `HttpBackend` seam the transport sends through.
//!
//! The API uses bearer token authentication obtained from
//! `/api/v1/auth/login`. A `401` from any endpoint ends the session.

pub mod client;
pub mod error;
pub mod transport;

pub use client::ApiClient;
pub use error::{ApiError, ErrorClass};
pub use transport::{
    ApiRequest, ApiResponse, AuthenticatedTransport, HttpBackend, Method, ReqwestBackend,
};
