//! Cache-or-fetch logic for one server and resource kind.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError};
use crate::auth::SessionGuard;
use crate::cache::{CacheKey, ResourceCache, ResourceKind};
use crate::models::{ActionLogEntry, DashboardStatus, Server};

use super::{DashboardView, DataSource};

/// A synchronized value of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceData {
    Status(DashboardStatus),
    ActionLogs(Vec<ActionLogEntry>),
}

impl ResourceData {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceData::Status(_) => ResourceKind::Status,
            ResourceData::ActionLogs(_) => ResourceKind::ActionLogs,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Value> {
        match self {
            ResourceData::Status(status) => serde_json::to_value(status),
            ResourceData::ActionLogs(entries) => serde_json::to_value(entries),
        }
    }

    pub fn from_json(kind: ResourceKind, value: Value) -> serde_json::Result<Self> {
        Ok(match kind {
            ResourceKind::Status => ResourceData::Status(serde_json::from_value(value)?),
            ResourceKind::ActionLogs => ResourceData::ActionLogs(serde_json::from_value(value)?),
        })
    }
}

/// Decides between the cache and the network for every read, and is the
/// only writer of the `ResourceCache`.
pub struct ResourceSynchronizer {
    api: ApiClient,
    cache: ResourceCache,
    view: Arc<dyn DashboardView>,
    action_log_limit: usize,
}

impl ResourceSynchronizer {
    pub fn new(
        api: ApiClient,
        cache: ResourceCache,
        view: Arc<dyn DashboardView>,
        action_log_limit: usize,
    ) -> Self {
        Self {
            api,
            cache,
            view,
            action_log_limit,
        }
    }

    pub fn session(&self) -> &SessionGuard {
        self.api.session()
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Return `kind` for `server`, from cache when allowed and fresh.
    ///
    /// With `force` set, or for kinds that are never cache-served, the
    /// backend is always called. A failed fetch leaves the cache untouched
    /// and reports the failure, with any stale value, to the view.
    pub async fn sync(
        &self,
        server: &Server,
        kind: ResourceKind,
        force: bool,
    ) -> Result<ResourceData, ApiError> {
        let token = self.session().require_session()?;
        let key = CacheKey::new(&server.id, kind);

        if !force && kind.cache_served() {
            if let Some(data) = self.fresh_cached(&key) {
                debug!(cache = %key, "Serving from cache");
                self.render(server, &data, DataSource::Cache);
                return Ok(data);
            }
        }

        debug!(cache = %key, force, "Fetching from backend");
        match self.fetch(server, kind).await {
            Ok(data) => {
                // The session may have ended, or been replaced, while the call was in flight
                if !self.is_current(&token) {
                    debug!(cache = %key, "Session changed during fetch, dropping result");
                    return Err(ApiError::NoSession);
                }
                self.store(&key, &data);
                self.render(server, &data, DataSource::Network);
                Ok(data)
            }
            Err(e) if e.is_auth() => {
                warn!(cache = %key, error = %e, "Sync stopped, session is no longer valid");
                Err(e)
            }
            Err(e) => {
                warn!(cache = %key, error = %e, "Sync failed");
                if self.is_current(&token) {
                    let stale = self.cached(&key);
                    self.view.degraded(server, kind, stale.as_ref(), &e);
                }
                Err(e)
            }
        }
    }

    pub async fn sync_status(&self, server: &Server, force: bool) -> Result<DashboardStatus, ApiError> {
        match self.sync(server, ResourceKind::Status, force).await? {
            ResourceData::Status(status) => Ok(status),
            other => Err(unexpected_kind(ResourceKind::Status, &other)),
        }
    }

    /// Action logs are always fetched.
    pub async fn sync_action_logs(&self, server: &Server) -> Result<Vec<ActionLogEntry>, ApiError> {
        match self.sync(server, ResourceKind::ActionLogs, true).await? {
            ResourceData::ActionLogs(entries) => Ok(entries),
            other => Err(unexpected_kind(ResourceKind::ActionLogs, &other)),
        }
    }

    /// Drop the cached value so the next read goes to the backend.
    pub fn invalidate(&self, server: &Server, kind: ResourceKind) {
        let key = CacheKey::new(&server.id, kind);
        if let Err(e) = self.cache.invalidate(&key) {
            warn!(cache = %key, error = %e, "Failed to invalidate cache entry");
        }
    }

    pub fn clear_cache(&self) -> Result<()> {
        self.cache.clear()
    }

    /// Whether `token` still names the installed session.
    fn is_current(&self, token: &str) -> bool {
        self.session().token().as_deref() == Some(token)
    }

    async fn fetch(&self, server: &Server, kind: ResourceKind) -> Result<ResourceData, ApiError> {
        match kind {
            ResourceKind::Status => self.api.fetch_status(&server.id).await.map(ResourceData::Status),
            ResourceKind::ActionLogs => self
                .api
                .fetch_action_logs(&server.id, self.action_log_limit)
                .await
                .map(ResourceData::ActionLogs),
        }
    }

    fn cached(&self, key: &CacheKey) -> Option<ResourceData> {
        let lookup = self.cache.get(key)?;
        match ResourceData::from_json(key.kind, lookup.data) {
            Ok(data) => Some(data),
            Err(e) => {
                debug!(cache = %key, error = %e, "Ignoring undecodable cache entry");
                None
            }
        }
    }

    fn fresh_cached(&self, key: &CacheKey) -> Option<ResourceData> {
        let lookup = self.cache.get(key).filter(|lookup| lookup.fresh)?;
        ResourceData::from_json(key.kind, lookup.data)
            .map_err(|e| debug!(cache = %key, error = %e, "Ignoring undecodable cache entry"))
            .ok()
    }

    fn store(&self, key: &CacheKey, data: &ResourceData) {
        let result = data
            .to_json()
            .map_err(anyhow::Error::from)
            .and_then(|value| self.cache.put(key, value, self.cache.now()));
        if let Err(e) = result {
            warn!(cache = %key, error = %e, "Failed to cache data");
        }
    }

    fn render(&self, server: &Server, data: &ResourceData, source: DataSource) {
        match data {
            ResourceData::Status(status) => self.view.status_updated(server, status, source),
            ResourceData::ActionLogs(entries) => self.view.action_logs_updated(server, entries),
        }
    }
}

fn unexpected_kind(expected: ResourceKind, got: &ResourceData) -> ApiError {
    ApiError::InvalidResponse(format!("expected {} data, got {}", expected, got.kind()))
}
