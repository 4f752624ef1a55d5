//! The engine assembled: one session, cache, synchronizer, action
//! coordinator and scheduler sharing a backend.

use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, AuthenticatedTransport, HttpBackend, ReqwestBackend};
use crate::auth::{SessionData, SessionFile, SessionGuard};
use crate::cache::{CacheKey, Clock, ResourceCache, ResourceKind, SystemClock};
use crate::config::Config;
use crate::models::{ActionLogEntry, DashboardStatus, Server, VmAction};
use crate::sync::{
    ActionCoordinator, ActionOutcome, Confirm, DashboardView, ResourceData, ResourceSynchronizer,
    Scheduler,
};

/// Subdirectory of the cache directory holding resource records
const RESOURCES_DIR: &str = "resources";

pub struct Dashboard {
    config: Config,
    session: SessionGuard,
    api: ApiClient,
    synchronizer: Arc<ResourceSynchronizer>,
    actions: ActionCoordinator,
    scheduler: Scheduler,
    servers: Mutex<Arc<[Server]>>,
}

impl Dashboard {
    /// Build against the configured backend, restoring any persisted session.
    pub fn new(config: Config, view: Arc<dyn DashboardView>) -> Result<Self> {
        config.policy.validate()?;
        let backend = ReqwestBackend::new(&config.api_base_url, config.policy.request_timeout())?;
        Self::with_backend(config, Arc::new(backend), view, Arc::new(SystemClock))
    }

    pub fn with_backend(
        config: Config,
        backend: Arc<dyn HttpBackend>,
        view: Arc<dyn DashboardView>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        let policy = config.policy.clone();
        policy.validate()?;

        let session = SessionGuard::new(SessionFile::new(cache_dir.clone()), policy.token_lifetime()?);
        let api = ApiClient::new(AuthenticatedTransport::new(backend, session.clone()));
        let cache = ResourceCache::new(cache_dir.join(RESOURCES_DIR), policy.cache_ttls()?, clock)?;

        let synchronizer = Arc::new(ResourceSynchronizer::new(
            api.clone(),
            cache,
            Arc::clone(&view),
            policy.action_log_limit,
        ));
        let actions = ActionCoordinator::new(
            api.clone(),
            Arc::clone(&synchronizer),
            Arc::clone(&view),
            policy.action_settle_delay(),
        );
        let scheduler = Scheduler::new(
            Arc::clone(&synchronizer),
            view,
            policy.status_interval(),
            policy.action_logs_interval(),
        );

        debug!(api = %config.api_base_url, cache = %cache_dir.display(), "Dashboard created");

        Ok(Self {
            config,
            session,
            api,
            synchronizer,
            actions,
            scheduler,
            servers: Mutex::new(Vec::<Server>::new().into()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &SessionGuard {
        &self.session
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn servers(&self) -> Arc<[Server]> {
        self.servers.lock().clone()
    }

    // ===== Session =====

    /// Log in and install the new session.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionData, ApiError> {
        let data = self.api.login(username, password).await?;
        self.session.establish(data.clone());
        Ok(data)
    }

    /// Stop every timer, end the session and wipe the resource cache.
    pub fn logout(&self) -> Result<()> {
        self.scheduler.stop();
        self.session.logout();
        *self.servers.lock() = Vec::<Server>::new().into();
        self.synchronizer.clear_cache()?;
        info!("Logged out");
        Ok(())
    }

    pub async fn health(&self) -> Result<(), ApiError> {
        self.api.health().await
    }

    // ===== Servers and sync =====

    /// Fetch the server list. It is not refreshed afterwards.
    pub async fn load_servers(&self) -> Result<Arc<[Server]>, ApiError> {
        let servers: Arc<[Server]> = self.api.list_servers().await?.into();
        *self.servers.lock() = Arc::clone(&servers);
        Ok(servers)
    }

    /// Load servers, run the first sync of every server, and start the scheduler.
    pub async fn initialize(&self) -> Result<Arc<[Server]>, ApiError> {
        self.session.require_session()?;
        let servers = self.load_servers().await?;
        info!(count = servers.len(), "Initial sync");

        join_all(servers.iter().map(|server| async move {
            // Failures were already reported to the view
            let _ = tokio::join!(
                self.synchronizer.sync(server, ResourceKind::Status, false),
                self.synchronizer.sync(server, ResourceKind::ActionLogs, true),
            );
        }))
        .await;

        if !self.session.has_session() {
            warn!("Session ended during initial sync");
            return Err(ApiError::NoSession);
        }

        self.scheduler.start(Arc::clone(&servers));
        Ok(servers)
    }

    /// Look a server up by id or name among the loaded servers.
    pub fn find_server(&self, reference: &str) -> Option<Server> {
        self.servers.lock().iter().find(|s| s.matches(reference)).cloned()
    }

    pub async fn sync(
        &self,
        server: &Server,
        kind: ResourceKind,
        force: bool,
    ) -> Result<ResourceData, ApiError> {
        self.synchronizer.sync(server, kind, force).await
    }

    pub async fn status(&self, server: &Server, force: bool) -> Result<DashboardStatus, ApiError> {
        self.synchronizer.sync_status(server, force).await
    }

    pub async fn action_logs(&self, server: &Server) -> Result<Vec<ActionLogEntry>, ApiError> {
        self.synchronizer.sync_action_logs(server).await
    }

    /// Sync both kinds for one server concurrently.
    pub async fn refresh(
        &self,
        server: &Server,
        force: bool,
    ) -> Result<(DashboardStatus, Vec<ActionLogEntry>), ApiError> {
        let (status, logs) = tokio::join!(self.status(server, force), self.action_logs(server));
        Ok((status?, logs?))
    }

    pub async fn invoke_action(
        &self,
        server: &Server,
        action: VmAction,
        confirm: &dyn Confirm,
    ) -> Result<ActionOutcome, ApiError> {
        self.actions.invoke(server, action, confirm).await
    }

    /// How old the cached status for `server` is, for display.
    pub fn status_age(&self, server: &Server) -> Option<String> {
        let key = CacheKey::new(&server.id, ResourceKind::Status);
        self.synchronizer.cache().age_display(&key)
    }
}
