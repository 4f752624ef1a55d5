//! Guardian CLI - a terminal front end for the GCP Guardian dashboard.
//!
//! Logs in against the Guardian backend, shows server status and action
//! history, starts and shuts down VMs, and can keep everything refreshed
//! with `guardian watch`.

mod prompt;
mod view;

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use guardian_core::{
    ActionOutcome, ApiError, Config, Dashboard, ErrorClass, Server, SessionState, VmAction,
};

use view::TerminalView;

/// Log file name prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "guardian.log";

#[derive(Parser)]
#[command(name = "guardian")]
#[command(about = "GCP Guardian - VM status, traffic and power control", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend URL (overrides config and GUARDIAN_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Also write logs to a daily file in the cache directory
    #[arg(long, global = true)]
    log_file: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },

    /// End the session and clear cached data
    Logout,

    /// List monitored servers
    Servers,

    /// Show power state and traffic
    Status {
        /// Server id or name (all servers when omitted)
        server: Option<String>,

        /// Skip the cache
        #[arg(short, long)]
        force: bool,
    },

    /// Show recent start/shutdown history
    Logs {
        /// Server id or name (all servers when omitted)
        server: Option<String>,
    },

    /// Start a VM
    Start {
        server: String,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Shut down a VM
    Shutdown {
        server: String,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Keep every server refreshed until interrupted
    Watch,

    /// Check that the backend is reachable
    Health,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&std::path::Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(url) = cli.api_url.clone() {
        config.api_base_url = url;
    }

    let log_dir = if cli.log_file {
        Some(config.cache_dir()?)
    } else {
        None
    };
    let _guard = init_tracing(log_dir.as_deref());
    info!(api = %config.api_base_url, "Guardian CLI starting");

    let watching = matches!(cli.command, Commands::Watch);
    let dashboard = Dashboard::new(config.clone(), Arc::new(TerminalView::new(watching)))?;

    let result = run(cli.command, &dashboard, config).await;
    dashboard.scheduler().stop();
    result
}

/// Run one command. A failure the view already reported yields
/// `ExitCode::FAILURE` instead of an error, so it is not printed twice.
async fn run(command: Commands, dashboard: &Dashboard, mut config: Config) -> Result<ExitCode> {
    match command {
        Commands::Login { username } => {
            let username = prompt::username(username, config.last_username.as_deref())?;
            let password = prompt::password()?;
            let data = dashboard.login(&username, &password).await.map_err(explain)?;
            println!("Logged in as {}", data.username);

            config.last_username = Some(data.username);
            config.save().context("Failed to save config")?;
        }

        Commands::Logout => {
            dashboard.logout()?;
            println!("Logged out");
        }

        Commands::Servers => {
            for server in dashboard.load_servers().await.map_err(explain)?.iter() {
                if server.name == server.id {
                    println!("{}", server.id);
                } else {
                    println!("{}  ({})", server.id, server.name);
                }
            }
        }

        Commands::Status { server, force } => {
            for server in select_servers(dashboard, server.as_deref()).await? {
                // Failures are printed by the view
                match dashboard.status(&server, force).await {
                    Ok(_) => {
                        if let Some(age) = dashboard.status_age(&server) {
                            println!("    updated {}", age);
                        }
                    }
                    Err(e) => check_auth(e)?,
                }
            }
        }

        Commands::Logs { server } => {
            for server in select_servers(dashboard, server.as_deref()).await? {
                if let Err(e) = dashboard.action_logs(&server).await {
                    check_auth(e)?;
                }
            }
        }

        Commands::Start { server, yes } => {
            return run_action(dashboard, &server, VmAction::Start, yes).await;
        }

        Commands::Shutdown { server, yes } => {
            return run_action(dashboard, &server, VmAction::Shutdown, yes).await;
        }

        Commands::Watch => return watch(dashboard).await,

        Commands::Health => {
            dashboard.health().await.map_err(explain)?;
            println!("{} is healthy", dashboard.config().api_base_url);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// All loaded servers, or the one `reference` names.
async fn select_servers(dashboard: &Dashboard, reference: Option<&str>) -> Result<Vec<Server>> {
    let servers = dashboard.load_servers().await.map_err(explain)?;
    match reference {
        None => Ok(servers.to_vec()),
        Some(reference) => dashboard
            .find_server(reference)
            .map(|server| vec![server])
            .ok_or_else(|| anyhow::anyhow!("Unknown server: {}", reference)),
    }
}

async fn run_action(
    dashboard: &Dashboard,
    reference: &str,
    action: VmAction,
    yes: bool,
) -> Result<ExitCode> {
    dashboard.load_servers().await.map_err(explain)?;
    let server = dashboard
        .find_server(reference)
        .ok_or_else(|| anyhow::anyhow!("Unknown server: {}", reference))?;

    let result = if yes {
        let always = |_: &Server, _: VmAction| true;
        dashboard.invoke_action(&server, action, &always).await
    } else {
        dashboard
            .invoke_action(&server, action, &prompt::confirm_action)
            .await
    };
    let outcome = result.map_err(explain)?;

    let succeeded = action_succeeded(&outcome);
    match outcome {
        ActionOutcome::Declined => println!("Cancelled"),
        ActionOutcome::Accepted { refresh, .. } => {
            println!(
                "Refreshing in {}s...",
                dashboard.config().policy.action_settle_secs
            );
            refresh.await.context("Refresh task failed")?;
        }
        // The view has already printed the backend's message
        ActionOutcome::Failed { .. } => {}
    }
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Only a rejected action fails the command; declining is not an error.
fn action_succeeded(outcome: &ActionOutcome) -> bool {
    !matches!(outcome, ActionOutcome::Failed { .. })
}

async fn watch(dashboard: &Dashboard) -> Result<ExitCode> {
    let mut session_rx = dashboard.session().subscribe();
    let servers = dashboard.initialize().await.map_err(explain)?;
    println!(
        "Watching {} server(s). Press Ctrl-C to stop.",
        servers.len()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(ExitCode::SUCCESS);
            }
            changed = session_rx.changed() => {
                if changed.is_err() {
                    return Ok(ExitCode::SUCCESS);
                }
                // The view has already said why the session ended
                match *session_rx.borrow_and_update() {
                    SessionState::Active => continue,
                    SessionState::LoginRequired => return Ok(ExitCode::FAILURE),
                    SessionState::LoggedOut => return Ok(ExitCode::SUCCESS),
                }
            }
        }
    }
}

/// Stop on auth failures; anything else was already shown by the view.
fn check_auth(error: ApiError) -> Result<()> {
    if error.class() == ErrorClass::Auth {
        Err(explain(error))
    } else {
        Ok(())
    }
}

fn explain(error: ApiError) -> anyhow::Error {
    match error {
        ApiError::NoSession | ApiError::Unauthorized => {
            anyhow::anyhow!("{}. Run `guardian login` first.", error)
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_rejected_action_fails_command() {
        let rejected = ActionOutcome::Failed {
            message: "VM is already running".to_string(),
        };
        assert!(!action_succeeded(&rejected));
        assert!(action_succeeded(&ActionOutcome::Declined));

        let accepted = ActionOutcome::Accepted {
            message: "VM start initiated.".to_string(),
            refresh: tokio::spawn(async {}),
        };
        assert!(action_succeeded(&accepted));
    }

    #[test]
    fn test_auth_errors_stop_other_errors_do_not() {
        assert!(check_auth(ApiError::Unauthorized).is_err());
        assert!(check_auth(ApiError::ServerError("Service Unavailable".to_string())).is_ok());
    }
}
