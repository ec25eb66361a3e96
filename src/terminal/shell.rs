//! Shell command execution for the `run` command.

use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Combined output of a finished command.
#[derive(Debug)]
pub struct ShellOutput {
    /// stdout followed by stderr.
    pub output: String,
    pub status: ExitStatus,
}

/// Run `command` through the platform shell and capture its output.
///
/// The child is killed if `cancel` fires first.
pub async fn run(command: &str, cancel: &CancellationToken) -> io::Result<ShellOutput> {
    let mut cmd = shell_command(command);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn()?;
    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "command cancelled"));
        }
        output = child.wait_with_output() => output?,
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(ShellOutput {
        output: combined,
        status: output.status,
    })
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("powershell");
    cmd.args(["-Command", command]);
    cmd
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("bash");
    cmd.args(["-c", command]);
    cmd
}
