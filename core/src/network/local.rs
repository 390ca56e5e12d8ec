//! Local programs.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{CommandOutput, CommandRunner};
use crate::error::TransportError;

/// Runs programs with `tokio::process`, optionally behind a fixed prefix such as
/// `sudo -n` for tools that need raw sockets.
#[derive(Clone, Debug, Default)]
pub struct LocalRunner {
    prefix: Vec<String>,
}

impl LocalRunner {
    pub fn new(prefix: Vec<String>) -> Self {
        Self { prefix }
    }

    fn command(&self, program: &str, args: &[String]) -> Command {
        let mut argv = self.prefix.iter().map(String::as_str).chain([program]);
        let mut command = Command::new(argv.next().unwrap_or(program));
        command.args(argv).args(args);
        command
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput, TransportError> {
        let mut command = self.command(program, args);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!("Running {program} {}", shell_words::join(args));

        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| TransportError::Exec(format!("{program} timed out after {}s", timeout.as_secs())))?
            .map_err(|e| TransportError::Exec(format!("{program}: {e}")))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_status: output.status.code(),
        })
    }
}
