//! Helpers for spawning the git CLI

use std::path::Path;
use std::process::{Command, Output, Stdio};
use tracing::debug;

use crate::credentials::Credentials;
use crate::error::{Error, Result};

/// Build a `git` command rooted at `dir`.
///
/// Credentials travel as environment-scoped config (`http.extraHeader`), never
/// as arguments, and prompting is disabled so an unattended run cannot hang.
pub(crate) fn git(dir: &Path, credentials: Option<&Credentials>) -> Command {
    let mut command = Command::new("git");
    command
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(credentials) = credentials {
        command
            .env("GIT_CONFIG_COUNT", "1")
            .env("GIT_CONFIG_KEY_0", "http.extraHeader")
            .env("GIT_CONFIG_VALUE_0", credentials.authorization_header());
    }

    command
}

/// Run a command, failing only if git could not be spawned
pub(crate) fn output(command: &mut Command, name: &str) -> Result<Output> {
    debug!("Running git {}", name);
    command.output().map_err(|e| Error::Git {
        command: name.to_string(),
        message: format!("failed to run git: {}", e),
    })
}

/// Run a command and require a zero exit status
pub(crate) fn checked(command: &mut Command, name: &str) -> Result<Output> {
    let output = output(command, name)?;
    if !output.status.success() {
        return Err(Error::Git {
            command: name.to_string(),
            message: stderr_message(&output),
        });
    }
    Ok(output)
}

pub(crate) fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Trimmed stderr, or the exit status when git printed nothing
pub(crate) fn stderr_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("exit status {}", output.status.code().unwrap_or(-1))
    } else {
        stderr
    }
}
