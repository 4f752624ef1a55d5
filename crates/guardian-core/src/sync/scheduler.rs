//! Periodic refresh of every server at two independent cadences.
//!
//! Status runs hourly and may be served from cache; action logs run every
//! five minutes and are always fetched. Each tick spawns one task per server
//! so a slow server never holds up the others. Every timer stops when the
//! session leaves `Active`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::auth::SessionState;
use crate::cache::ResourceKind;
use crate::models::Server;

use super::{DashboardView, ResourceSynchronizer};

/// One periodic refresh applied to every server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cadence {
    kind: ResourceKind,
    period: Duration,
    force: bool,
}

pub struct Scheduler {
    synchronizer: Arc<ResourceSynchronizer>,
    view: Arc<dyn DashboardView>,
    cadences: Vec<Cadence>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        synchronizer: Arc<ResourceSynchronizer>,
        view: Arc<dyn DashboardView>,
        status_interval: Duration,
        action_logs_interval: Duration,
    ) -> Self {
        let cadences = vec![
            Cadence {
                kind: ResourceKind::Status,
                period: status_interval,
                force: false,
            },
            Cadence {
                kind: ResourceKind::ActionLogs,
                period: action_logs_interval,
                force: true,
            },
        ];
        Self {
            synchronizer,
            view,
            cadences,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start every cadence for `servers`, replacing any running timers.
    ///
    /// The first tick of each cadence fires one full period from now.
    pub fn start(&self, servers: Arc<[Server]>) {
        self.stop();

        if !self.synchronizer.session().has_session() {
            warn!("Not starting scheduler without a session");
            return;
        }

        let mut tasks = Vec::with_capacity(self.cadences.len() + 1);
        for cadence in &self.cadences {
            tasks.push(self.spawn_cadence(*cadence, Arc::clone(&servers)));
        }
        tasks.push(self.spawn_session_watch());

        info!(servers = servers.len(), "Scheduler started");
        *self.tasks.lock() = tasks;
    }

    /// Abort all timers. Syncs already in flight run to completion.
    pub fn stop(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        if tasks.is_empty() {
            return;
        }
        for task in tasks {
            task.abort();
        }
        info!("Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.tasks.lock().iter().any(|task| !task.is_finished())
    }

    fn spawn_cadence(&self, cadence: Cadence, servers: Arc<[Server]>) -> JoinHandle<()> {
        let synchronizer = Arc::clone(&self.synchronizer);
        let mut session_rx = synchronizer.session().subscribe();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + cadence.period, cadence.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !synchronizer.session().has_session() {
                            break;
                        }
                        debug!(kind = %cadence.kind, servers = servers.len(), "Scheduled sync");
                        for server in servers.iter() {
                            let synchronizer = Arc::clone(&synchronizer);
                            let server = server.clone();
                            // Failures are reported to the view by the synchronizer
                            tokio::spawn(async move {
                                let _ = synchronizer.sync(&server, cadence.kind, cadence.force).await;
                            });
                        }
                    }
                    changed = session_rx.changed() => {
                        if changed.is_err() || *session_rx.borrow_and_update() != SessionState::Active {
                            break;
                        }
                    }
                }
            }
            debug!(kind = %cadence.kind, "Cadence stopped");
        })
    }

    fn spawn_session_watch(&self) -> JoinHandle<()> {
        let view = Arc::clone(&self.view);
        let mut session_rx = self.synchronizer.session().subscribe();

        tokio::spawn(async move {
            while session_rx.changed().await.is_ok() {
                let state = *session_rx.borrow_and_update();
                if state != SessionState::Active {
                    info!(?state, "Session ended, scheduled refresh halted");
                    view.session_ended(state);
                    return;
                }
            }
        })
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
