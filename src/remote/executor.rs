//! Remote command execution over the system `ssh` client
//!
//! Every call spawns one non-interactive `ssh` process that runs one
//! command and exits. Status and metric queries each pay their own
//! connection setup; there is no session reuse.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, trace};

use crate::models::{Host, JumpHost};

/// Hard upper bound for a single remote command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors produced while running a remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The local `ssh` process could not be started
    Spawn(String),

    /// The command did not finish within the timeout
    Timeout(Duration),

    /// `ssh` or the remote command exited unsuccessfully
    CommandFailed { code: Option<i32>, stderr: String },

    /// The command produced output that is not valid UTF-8
    Utf8(String),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Spawn(msg) => write!(f, "failed to start ssh: {}", msg),
            ExecError::Timeout(after) => {
                write!(f, "command timed out after {}s", after.as_secs())
            }
            ExecError::CommandFailed { code, stderr } => {
                match code {
                    Some(code) => write!(f, "command exited with status {}", code)?,
                    None => write!(f, "command terminated by signal")?,
                }
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr)?;
                }
                Ok(())
            }
            ExecError::Utf8(msg) => write!(f, "command output is not valid UTF-8: {}", msg),
        }
    }
}

impl std::error::Error for ExecError {}

/// Connection parameters for one remote host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub address: String,
    pub port: u16,
    pub user: Option<String>,
    pub key_path: Option<String>,
    pub jump_hosts: Vec<JumpHost>,
}

impl SshTarget {
    pub fn from_host(host: &Host) -> Self {
        Self {
            address: host.address.clone(),
            port: host.port,
            user: host.ssh_user.clone(),
            key_path: host.ssh_key_path.clone(),
            jump_hosts: host.jump_hosts.clone(),
        }
    }

    /// `user@address`, or the bare address without a user
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) if !user.is_empty() => format!("{user}@{}", self.address),
            _ => self.address.clone(),
        }
    }
}

/// Runs a single shell command on a remote host
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Execute `command` and return its standard output
    async fn execute(&self, target: &SshTarget, command: &str) -> Result<String, ExecError>;
}

/// [`RemoteExecutor`] backed by the OpenSSH client binary
#[derive(Debug, Clone)]
pub struct SshExecutor {
    binary: String,
    timeout: Duration,
}

impl Default for SshExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl SshExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: "ssh".to_string(),
            timeout,
        }
    }

    /// Use a different client binary (tests, wrappers)
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Argument vector passed to the ssh binary
    ///
    /// Host keys are not verified and the client never prompts. Keepalives
    /// detect a dead path within roughly ten seconds and only one
    /// connection attempt is made.
    pub fn build_args(target: &SshTarget, command: &str) -> Vec<String> {
        let mut args: Vec<String> = [
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "ConnectTimeout=5",
            "-o",
            "ServerAliveInterval=5",
            "-o",
            "ServerAliveCountMax=2",
            "-o",
            "ConnectionAttempts=1",
            "-o",
            "BatchMode=yes",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.push("-p".to_string());
        args.push(target.port.to_string());

        if let Some(key) = target.key_path.as_deref().filter(|k| !k.is_empty()) {
            args.push("-i".to_string());
            args.push(key.to_string());
        }

        if !target.jump_hosts.is_empty() {
            // ssh tries every IdentityFile for every hop
            for key in target
                .jump_hosts
                .iter()
                .filter_map(|jump| jump.key_path.as_deref())
                .filter(|k| !k.is_empty())
            {
                args.push("-o".to_string());
                args.push(format!("IdentityFile={key}"));
            }

            let chain = target
                .jump_hosts
                .iter()
                .map(JumpHost::spec)
                .collect::<Vec<_>>()
                .join(",");
            args.push("-J".to_string());
            args.push(chain);
        }

        args.push(target.destination());
        args.push(command.to_string());
        args
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    #[instrument(skip(self, target), fields(host = %target.address))]
    async fn execute(&self, target: &SshTarget, command: &str) -> Result<String, ExecError> {
        let args = Self::build_args(target, command);
        trace!("running {} {:?}", self.binary, args);

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::Spawn(e.to_string()))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecError::Timeout(self.timeout))?
            .map_err(|e| ExecError::Spawn(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!("remote command failed: {:?} {}", output.status.code(), stderr);
            return Err(ExecError::CommandFailed {
                code: output.status.code(),
                stderr,
            });
        }

        String::from_utf8(output.stdout).map_err(|e| ExecError::Utf8(e.to_string()))
    }
}
