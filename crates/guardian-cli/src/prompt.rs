//! Interactive input: credentials and action confirmation.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use guardian_core::models::{Server, VmAction};

pub const USERNAME_ENV: &str = "GUARDIAN_USERNAME";
pub const PASSWORD_ENV: &str = "GUARDIAN_PASSWORD";

/// Username from the flag, the environment, the last login, or a prompt.
pub fn username(flag: Option<String>, last: Option<&str>) -> Result<String> {
    if let Some(name) = flag.or_else(|| env_value(USERNAME_ENV)) {
        return Ok(name);
    }

    match last {
        Some(last) => print!("Username [{}]: ", last),
        None => print!("Username: "),
    }
    io::stdout().flush()?;

    let line = read_line()?;
    match (line.is_empty(), last) {
        (true, Some(last)) => Ok(last.to_string()),
        (true, None) => anyhow::bail!("Username is required"),
        (false, _) => Ok(line),
    }
}

pub fn password() -> Result<String> {
    if let Some(password) = env_value(PASSWORD_ENV) {
        return Ok(password);
    }
    rpassword::prompt_password("Password: ").context("Failed to read password")
}

/// Ask `Start vm-1? [y/N]` on the terminal. Anything but yes declines.
pub fn confirm_action(server: &Server, action: VmAction) -> bool {
    print!("{} {}? [y/N]: ", action.label(), server.name);
    if io::stdout().flush().is_err() {
        return false;
    }
    match read_line() {
        Ok(answer) => is_yes(&answer),
        Err(_) => false,
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
}

fn read_line() -> Result<String> {
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
