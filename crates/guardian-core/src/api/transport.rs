//! Wire layer and the authenticated request path.
//!
//! `HttpBackend` is the seam between the engine and the network: the
//! production implementation is `ReqwestBackend`, tests script their own.
//! `AuthenticatedTransport` is the only way engine components reach an
//! authenticated endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::SessionGuard;

use super::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single outbound call, independent of the HTTP library.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub form: Option<Vec<(String, String)>>,
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            form: None,
            bearer: None,
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        self.form = Some(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// Status and raw body of a completed call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
pub trait HttpBackend: Send + Sync {
    /// Issue the request once. Non-2xx statuses are returned, not raised.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// `HttpBackend` over a pooled reqwest client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestBackend {
    client: Client,
    base_url: String,
}

impl ReqwestBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        }
        .header(header::ACCEPT, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref fields) = request.form {
            builder = builder.form(fields);
        }
        if let Some(ref token) = request.bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(url = %url, status, "Response received");

        Ok(ApiResponse { status, body })
    }
}

/// Attaches the session token to every call and ends the session on `401`.
#[derive(Clone)]
pub struct AuthenticatedTransport {
    backend: Arc<dyn HttpBackend>,
    session: SessionGuard,
}

impl AuthenticatedTransport {
    pub fn new(backend: Arc<dyn HttpBackend>, session: SessionGuard) -> Self {
        Self { backend, session }
    }

    pub fn session(&self) -> &SessionGuard {
        &self.session
    }

    /// The unauthenticated path, used for login and health checks.
    pub fn backend(&self) -> &Arc<dyn HttpBackend> {
        &self.backend
    }

    /// Issue an authenticated request exactly once.
    ///
    /// Fails with `ApiError::NoSession` before touching the network when
    /// there is no session. A `401` tears the session down and is reported
    /// as `ApiError::Unauthorized`; every other status is returned as-is.
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let token = self.session.require_session()?;
        let path = request.path.clone();

        let response = self.backend.execute(request.bearer(token.clone())).await?;

        if response.status == 401 {
            warn!(path = %path, "Request rejected as unauthorized, ending session");
            self.session.revoke(&token);
            return Err(ApiError::Unauthorized);
        }

        Ok(response)
    }
}
