//! API client for the Guardian REST API.
//!
//! This module provides the `ApiClient` struct for logging in and making
//! authenticated calls for servers, status, action logs and VM actions.

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::auth::{SessionData, SessionGuard};
use crate::models::{
    normalize_action_log, ActionLogEntry, ActionResponse, DashboardStatus, Server, VmAction,
};
use crate::utils::encode_segment;

use super::{ApiError, ApiRequest, ApiResponse, AuthenticatedTransport};

// ============================================================================
// Endpoints
// ============================================================================

const LOGIN_PATH: &str = "/api/v1/auth/login";
const SERVERS_PATH: &str = "/api/v1/servers";
const ACTION_LOGS_PATH: &str = "/api/v1/logs/actions";
const HEALTH_PATH: &str = "/health";

/// Shown when an action fails without a server-provided detail.
const GENERIC_ACTION_FAILURE: &str = "Action failed. Please try again.";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// Typed endpoints over an `AuthenticatedTransport`.
/// Clone is cheap - the transport shares the backend and session.
#[derive(Clone)]
pub struct ApiClient {
    transport: AuthenticatedTransport,
}

impl ApiClient {
    pub fn new(transport: AuthenticatedTransport) -> Self {
        Self { transport }
    }

    pub fn session(&self) -> &SessionGuard {
        self.transport.session()
    }

    /// Exchange credentials for a bearer token.
    ///
    /// Does not touch the current session; the caller installs the result.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionData, ApiError> {
        let request =
            ApiRequest::post(LOGIN_PATH).form(&[("username", username), ("password", password)]);

        let response = self.transport.backend().execute(request).await?;

        if !response.is_success() {
            let detail = ApiError::detail_message(&response.body)
                .unwrap_or_else(|| format!("status {}", response.status));
            warn!(username, status = response.status, "Login rejected");
            return Err(ApiError::LoginRejected(detail));
        }

        let login: LoginResponse = response.json()?;
        if let Some(ref kind) = login.token_type {
            if !kind.eq_ignore_ascii_case("bearer") {
                warn!(token_type = %kind, "Unexpected token type, using it as a bearer token");
            }
        }

        info!(username, "Login successful");
        Ok(SessionData::new(login.access_token, username))
    }

    /// Unauthenticated liveness check.
    pub async fn health(&self) -> Result<(), ApiError> {
        let response = self.transport.backend().execute(ApiRequest::get(HEALTH_PATH)).await?;
        let response = Self::check_response(response)?;
        let health: HealthResponse = response.json()?;
        if health.status == "ok" {
            Ok(())
        } else {
            Err(ApiError::ServerError(format!("health status {}", health.status)))
        }
    }

    /// Check if response is successful, returning an error with body if not.
    fn check_response(response: ApiResponse) -> Result<ApiResponse, ApiError> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(ApiError::from_status(response.status, &response.body))
        }
    }

    // ===== Data Fetching Methods =====

    /// Fetch the servers this account monitors
    pub async fn list_servers(&self) -> Result<Vec<Server>, ApiError> {
        let response = self.transport.request(ApiRequest::get(SERVERS_PATH)).await?;
        let servers: Vec<Server> = Self::check_response(response)?.json()?;
        debug!(count = servers.len(), "Servers fetched");
        Ok(servers)
    }

    /// Fetch power state and traffic for one server
    pub async fn fetch_status(&self, server_id: &str) -> Result<DashboardStatus, ApiError> {
        let path = format!("{}/{}/status", SERVERS_PATH, encode_segment(server_id));
        let response = self.transport.request(ApiRequest::get(path)).await?;
        Self::check_response(response)?.json()
    }

    /// Fetch the most recent actions for one server, newest first
    pub async fn fetch_action_logs(
        &self,
        server_id: &str,
        limit: usize,
    ) -> Result<Vec<ActionLogEntry>, ApiError> {
        let request = ApiRequest::get(ACTION_LOGS_PATH)
            .query("server_id", server_id)
            .query("limit", limit);
        let response = self.transport.request(request).await?;
        let entries: Vec<ActionLogEntry> = Self::check_response(response)?.json()?;
        Ok(normalize_action_log(entries, limit))
    }

    // ===== Actions =====

    /// Ask the backend to start or shut down a server.
    ///
    /// Returns the server's confirmation message. Any non-2xx other than
    /// `401` becomes `ApiError::ActionRejected` with the server's detail.
    pub async fn perform_action(&self, server_id: &str, action: VmAction) -> Result<String, ApiError> {
        let path = format!(
            "{}/{}/{}",
            SERVERS_PATH,
            encode_segment(server_id),
            action.endpoint()
        );
        let response = self.transport.request(ApiRequest::post(path)).await?;

        if !response.is_success() {
            let detail = ApiError::detail_message(&response.body)
                .unwrap_or_else(|| GENERIC_ACTION_FAILURE.to_string());
            warn!(server_id, %action, status = response.status, "Action rejected");
            return Err(ApiError::ActionRejected(detail));
        }

        // The message is informational; an odd body does not fail the action
        let body: ActionResponse = serde_json::from_str(&response.body).unwrap_or_default();
        Ok(body
            .message
            .unwrap_or_else(|| format!("{} requested.", action.label())))
    }
}
