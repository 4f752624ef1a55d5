//! User-triggered VM actions and the refresh that follows them.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::cache::ResourceKind;
use crate::models::{Server, VmAction};

use super::{DashboardView, ResourceSynchronizer};

/// Confirmation gate in front of every action.
pub trait Confirm: Send + Sync {
    fn confirm(&self, server: &Server, action: VmAction) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&Server, VmAction) -> bool + Send + Sync,
{
    fn confirm(&self, server: &Server, action: VmAction) -> bool {
        self(server, action)
    }
}

#[derive(Debug)]
pub enum ActionOutcome {
    /// The user said no. Nothing was sent.
    Declined,
    /// The backend accepted the action. `refresh` re-syncs the server once
    /// the settle delay has passed.
    Accepted {
        message: String,
        refresh: JoinHandle<()>,
    },
    /// The backend refused the action or could not be reached.
    Failed { message: String },
}

impl ActionOutcome {
    pub fn message(&self) -> Option<&str> {
        match self {
            ActionOutcome::Declined => None,
            ActionOutcome::Accepted { message, .. } | ActionOutcome::Failed { message } => {
                Some(message)
            }
        }
    }
}

pub struct ActionCoordinator {
    api: ApiClient,
    synchronizer: Arc<ResourceSynchronizer>,
    view: Arc<dyn DashboardView>,
    settle_delay: Duration,
}

impl ActionCoordinator {
    pub fn new(
        api: ApiClient,
        synchronizer: Arc<ResourceSynchronizer>,
        view: Arc<dyn DashboardView>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            api,
            synchronizer,
            view,
            settle_delay,
        }
    }

    /// Confirm, perform `action` on `server`, and schedule one forced
    /// refresh of its status and action log.
    ///
    /// Only auth failures are returned as `Err`; a refused action is an
    /// `ActionOutcome::Failed` carrying the message to show.
    pub async fn invoke(
        &self,
        server: &Server,
        action: VmAction,
        confirm: &dyn Confirm,
    ) -> Result<ActionOutcome, ApiError> {
        self.api.session().require_session()?;

        if !confirm.confirm(server, action) {
            debug!(server = %server.id, %action, "Action declined");
            return Ok(ActionOutcome::Declined);
        }

        info!(server = %server.id, %action, "Requesting action");
        match self.api.perform_action(&server.id, action).await {
            Ok(message) => {
                self.synchronizer.invalidate(server, ResourceKind::Status);
                self.view.action_finished(server, action, &message, true);
                let refresh = self.schedule_refresh(server.clone());
                Ok(ActionOutcome::Accepted { message, refresh })
            }
            Err(e) if e.is_auth() => Err(e),
            Err(e) => {
                warn!(server = %server.id, %action, error = %e, "Action failed");
                let message = e.to_string();
                self.view.action_finished(server, action, &message, false);
                Ok(ActionOutcome::Failed { message })
            }
        }
    }

    fn schedule_refresh(&self, server: Server) -> JoinHandle<()> {
        let synchronizer = Arc::clone(&self.synchronizer);
        let delay = self.settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !synchronizer.session().has_session() {
                debug!(server = %server.id, "Session ended, skipping post-action refresh");
                return;
            }
            debug!(server = %server.id, "Post-action refresh");
            // Failures were already reported to the view
            let _ = tokio::join!(
                synchronizer.sync(&server, ResourceKind::Status, true),
                synchronizer.sync(&server, ResourceKind::ActionLogs, true),
            );
        })
    }
}
