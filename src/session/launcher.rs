//! Launchers produce a fresh connection to a language server for each session

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ServerCommand;
use crate::host::Host;
use crate::session::SessionError;
use crate::transport::Connection;

/// Creates the connection backing one session
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Launches a language server and returns a connection to it.
    ///
    /// Requests on the returned connection are bounded by `request_timeout`.
    async fn launch(&self, request_timeout: Duration) -> Result<Connection, SessionError>;
}

/// Spawns the language server as a child process speaking over stdio
pub struct ProcessLauncher {
    command: ServerCommand,
    output: Arc<dyn Host>,
}

impl ProcessLauncher {
    /// `output` receives the server's stderr, line by line.
    pub fn new(command: ServerCommand, output: Arc<dyn Host>) -> Self {
        Self { command, output }
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, request_timeout: Duration) -> Result<Connection, SessionError> {
        let program = self.command.program.clone();
        info!("Launching language server {} {:?}", program, self.command.args);

        let mut cmd = Command::new(&program);
        cmd.args(&self.command.args)
            .envs(&self.command.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.command.cwd {
            cmd.current_dir(cwd);
        }

        let spawn_error = |reason: String| SessionError::Spawn {
            program: program.clone(),
            reason,
        };

        let mut child = cmd.spawn().map_err(|e| spawn_error(e.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("failed to capture stdout".into()))?;

        if let Some(stderr) = child.stderr.take() {
            let output = Arc::clone(&self.output);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    output.append_output(&line);
                }
                debug!("Language server stderr closed");
            });
        }

        Ok(Connection::new(stdout, stdin, request_timeout).with_child(child))
    }
}
