//! Scripted backend, clock and view shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::api::{ApiError, ApiRequest, ApiResponse, HttpBackend, Method};
use crate::auth::{SessionData, SessionGuard, SessionState};
use crate::cache::{Clock, ResourceKind};
use crate::models::{ActionLogEntry, DashboardStatus, Server, VmAction, VmState};
use crate::sync::{DashboardView, DataSource, ResourceData};

const SERVERS_PATH: &str = "/api/v1/servers";

#[derive(Debug, Clone)]
pub struct Call {
    pub request: ApiRequest,
    pub at: Instant,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    unauthorized: bool,
    status_failure: Option<u16>,
    action_failure: Option<(u16, String)>,
    action_logs: HashMap<String, Value>,
    hung: HashSet<String>,
    delay: Option<std::time::Duration>,
}

/// In-memory Guardian backend with two servers, `vm-1` and `vm-2`.
/// Accepts `admin` / `secret`.
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn calls_matching(&self, fragment: &str) -> Vec<Call> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.request.path.contains(fragment))
            .cloned()
            .collect()
    }

    /// Calls whose path contains `fragment`.
    pub fn count(&self, fragment: &str) -> usize {
        self.calls_matching(fragment).len()
    }

    pub fn count_exact(&self, path: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.request.path == path)
            .count()
    }

    /// Answer every authenticated call with `401`.
    pub fn set_unauthorized(&self, on: bool) {
        self.state.lock().unauthorized = on;
    }

    pub fn set_status_failure(&self, status: Option<u16>) {
        self.state.lock().status_failure = status;
    }

    pub fn set_action_failure(&self, failure: Option<(u16, String)>) {
        self.state.lock().action_failure = failure;
    }

    pub fn set_action_log(&self, server_id: &str, entries: Value) {
        self.state
            .lock()
            .action_logs
            .insert(server_id.to_string(), entries);
    }

    /// Never answer calls for `server_id`.
    pub fn set_hang(&self, server_id: &str, on: bool) {
        let mut state = self.state.lock();
        if on {
            state.hung.insert(server_id.to_string());
        } else {
            state.hung.remove(server_id);
        }
    }

    /// Wait `delay` before answering each call.
    pub fn set_delay(&self, delay: Option<std::time::Duration>) {
        self.state.lock().delay = delay;
    }

    fn respond(state: &FakeState, request: &ApiRequest) -> ApiResponse {
        let path = request.path.as_str();

        if path == "/health" {
            return ApiResponse::new(200, json!({"status": "ok"}).to_string());
        }
        if path == "/api/v1/auth/login" {
            return Self::login(request);
        }
        if request.bearer.is_none() || state.unauthorized {
            return ApiResponse::new(401, json!({"detail": "Could not validate credentials"}).to_string());
        }

        if path == SERVERS_PATH {
            return ApiResponse::new(
                200,
                json!([{"id": "vm-1", "name": "vm-1"}, {"id": "vm-2", "name": "vm-2"}]).to_string(),
            );
        }
        if path == "/api/v1/logs/actions" {
            let body = query_server(request)
                .and_then(|id| state.action_logs.get(&id).cloned())
                .unwrap_or_else(|| json!([]));
            return ApiResponse::new(200, body.to_string());
        }

        if let Some(rest) = path.strip_prefix("/api/v1/servers/") {
            if let Some(id) = rest.strip_suffix("/status") {
                if let Some(status) = state.status_failure {
                    return ApiResponse::new(status, "Service Unavailable");
                }
                let body = serde_json::to_string(&running_status(id)).unwrap();
                return ApiResponse::new(200, body);
            }
            for action in [VmAction::Start, VmAction::Shutdown] {
                if rest.ends_with(&format!("/{}", action.endpoint())) && request.method == Method::Post {
                    if let Some((status, ref body)) = state.action_failure {
                        return ApiResponse::new(status, body.clone());
                    }
                    let message = match action {
                        VmAction::Start => "VM start initiated.",
                        VmAction::Shutdown => "VM shutdown initiated.",
                    };
                    return ApiResponse::new(200, json!({"message": message}).to_string());
                }
            }
        }

        ApiResponse::new(404, json!({"detail": "Not Found"}).to_string())
    }

    fn login(request: &ApiRequest) -> ApiResponse {
        let field = |name: &str| {
            request
                .form
                .as_ref()
                .and_then(|form| form.iter().find(|(k, _)| k == name))
                .map(|(_, v)| v.clone())
        };
        match (field("username"), field("password")) {
            (Some(user), Some(pass)) if user == "admin" && pass == "secret" => ApiResponse::new(
                200,
                json!({"access_token": format!("token-{}", user), "token_type": "bearer"}).to_string(),
            ),
            _ => ApiResponse::new(401, json!({"detail": "Incorrect username or password"}).to_string()),
        }
    }

    fn targets(request: &ApiRequest, server_id: &str) -> bool {
        request.path.contains(&format!("/{}/", server_id))
            || query_server(request).as_deref() == Some(server_id)
    }
}

fn query_server(request: &ApiRequest) -> Option<String> {
    request
        .query
        .iter()
        .find(|(k, _)| k == "server_id")
        .map(|(_, v)| v.clone())
}

#[async_trait]
impl HttpBackend for FakeApi {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let (hang, delay) = {
            let mut state = self.state.lock();
            state.calls.push(Call {
                request: request.clone(),
                at: Instant::now(),
            });
            let hang = state.hung.iter().any(|id| Self::targets(&request, id));
            (hang, state.delay)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        // Answer from the state at reply time
        Ok(Self::respond(&self.state.lock(), &request))
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        ManualClock::now(self)
    }
}

pub fn session_with_token(token: &str) -> SessionGuard {
    let session = SessionGuard::in_memory();
    session.establish(SessionData::new(token, "admin"));
    session
}

/// The status `FakeApi` reports for every server.
pub fn running_status(instance_name: &str) -> DashboardStatus {
    DashboardStatus {
        server_id: None,
        instance_name: instance_name.to_string(),
        status: VmState::Running,
        current_traffic_gb: 1.5,
        traffic_threshold_gb: 100.0,
        traffic_usage_percent: 1.5,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Status(String, DataSource),
    Logs(String, usize),
    /// Server, kind, and whether stale data was available.
    Degraded(String, ResourceKind, bool),
    Action(String, VmAction, String, bool),
    SessionEnded(SessionState),
}

#[derive(Default)]
pub struct RecordingView {
    events: Mutex<Vec<ViewEvent>>,
}

impl RecordingView {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().clone()
    }

    pub fn count_logs(&self, server_id: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, ViewEvent::Logs(id, _) if id == server_id))
            .count()
    }

    fn push(&self, event: ViewEvent) {
        self.events.lock().push(event);
    }
}

impl DashboardView for RecordingView {
    fn status_updated(&self, server: &Server, _status: &DashboardStatus, source: DataSource) {
        self.push(ViewEvent::Status(server.id.clone(), source));
    }

    fn action_logs_updated(&self, server: &Server, entries: &[ActionLogEntry]) {
        self.push(ViewEvent::Logs(server.id.clone(), entries.len()));
    }

    fn degraded(
        &self,
        server: &Server,
        kind: ResourceKind,
        stale: Option<&ResourceData>,
        _error: &ApiError,
    ) {
        self.push(ViewEvent::Degraded(server.id.clone(), kind, stale.is_some()));
    }

    fn action_finished(&self, server: &Server, action: VmAction, message: &str, success: bool) {
        self.push(ViewEvent::Action(
            server.id.clone(),
            action,
            message.to_string(),
            success,
        ));
    }

    fn session_ended(&self, state: SessionState) {
        self.push(ViewEvent::SessionEnded(state));
    }
}
