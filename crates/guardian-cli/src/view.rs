//! Plain-text rendering of engine updates.

use chrono::Local;
use guardian_core::models::{ActionLogEntry, DashboardStatus, Server, VmAction};
use guardian_core::utils::{format_action_log, format_status_line};
use guardian_core::{ApiError, DashboardView, DataSource, ResourceData, ResourceKind, SessionState};

/// Prints every update to stdout. With `timestamps` set each block is
/// prefixed with the local time, for `watch`.
pub struct TerminalView {
    timestamps: bool,
}

impl TerminalView {
    pub fn new(timestamps: bool) -> Self {
        Self { timestamps }
    }

    fn header(&self, server: &Server, what: &str) -> String {
        if self.timestamps {
            format!("[{}] {} {}", Local::now().format("%H:%M:%S"), server.name, what)
        } else {
            format!("{} {}", server.name, what)
        }
    }

    fn print_logs(entries: &[ActionLogEntry]) {
        for line in format_action_log(entries) {
            println!("    {}", line);
        }
    }
}

impl DashboardView for TerminalView {
    fn status_updated(&self, server: &Server, status: &DashboardStatus, source: DataSource) {
        let tag = match source {
            DataSource::Cache => " (cached)",
            DataSource::Network => "",
        };
        println!("{}", self.header(server, &format!("status{}", tag)));
        println!("    {}", format_status_line(status));
        if status.over_threshold() {
            println!("    traffic threshold exceeded");
        }
    }

    fn action_logs_updated(&self, server: &Server, entries: &[ActionLogEntry]) {
        println!("{}", self.header(server, "recent actions"));
        Self::print_logs(entries);
    }

    fn degraded(
        &self,
        server: &Server,
        kind: ResourceKind,
        stale: Option<&ResourceData>,
        error: &ApiError,
    ) {
        eprintln!("{}", self.header(server, &format!("{} refresh failed: {}", kind, error)));
        match stale {
            Some(ResourceData::Status(status)) => {
                println!("    last known: {}", format_status_line(status));
            }
            Some(ResourceData::ActionLogs(entries)) => {
                println!("    last known actions:");
                Self::print_logs(entries);
            }
            None => println!("    no data available"),
        }
    }

    fn action_finished(&self, server: &Server, action: VmAction, message: &str, success: bool) {
        if success {
            println!("{}: {}", server.name, message);
        } else {
            eprintln!("{} failed on {}: {}", action.label(), server.name, message);
        }
    }

    fn session_ended(&self, state: SessionState) {
        match state {
            SessionState::LoginRequired => {
                eprintln!("Session expired. Run `guardian login` to sign in again.")
            }
            SessionState::LoggedOut => eprintln!("Logged out."),
            SessionState::Active => {}
        }
    }
}
