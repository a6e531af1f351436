//! Local service probing for the agent
//!
//! Uses the same status interpreter as the hub's SSH path, with commands
//! run by the local shell and process usage read through `sysinfo`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::process::Command;
use tracing::{instrument, trace};

use crate::ingest::ServiceReport;
use crate::remote::executor::ExecError;
use crate::remote::interpreter::{self, CommandRunner, Inspection, OsFamily, ProcessUsage};

/// Runs commands with the platform shell
#[derive(Debug, Clone)]
pub struct LocalShell {
    timeout: Duration,
}

impl LocalShell {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn command(command: &str) -> Command {
        if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command]);
            cmd
        }
    }
}

#[async_trait]
impl CommandRunner for LocalShell {
    async fn run(&self, command: &str) -> Result<String, ExecError> {
        trace!("running {}", command);

        let child = Self::command(command)
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
            return Err(ExecError::CommandFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|e| ExecError::Utf8(e.to_string()))
    }

    async fn process_usage(&self, _os: OsFamily, pid: u32) -> Option<ProcessUsage> {
        tokio::task::spawn_blocking(move || {
            let pid = Pid::from_u32(pid);
            let mut sys = System::new();
            sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

            sys.process(pid).map(|process| ProcessUsage {
                memory_kb: process.memory() / 1024,
                cpu_percent: f64::from(process.cpu_usage()),
            })
        })
        .await
        .ok()
        .flatten()
    }
}

/// Turn an inspection into the wire entry for a report
pub fn to_report(name: &str, inspection: Inspection) -> ServiceReport {
    let mut report = ServiceReport::new(name, inspection.status);
    report.error_message = inspection.error;
    if let Some(info) = inspection.info {
        report.pid = info.pid;
        report.memory_kb = info.memory_kb;
        report.cpu_percent = info.cpu_percent;
        report.uptime_seconds = info.uptime_seconds;
    }
    report
}

/// Probes services on the machine the agent runs on
pub struct LocalProbe<R = LocalShell> {
    runner: R,
    os: String,
}

impl LocalProbe<LocalShell> {
    pub fn new(timeout: Duration) -> Self {
        Self::with_runner(
            LocalShell::new(timeout),
            OsFamily::current().map_or(std::env::consts::OS, |os| os.as_str()),
        )
    }
}

impl<R: CommandRunner> LocalProbe<R> {
    pub fn with_runner(runner: R, os: impl Into<String>) -> Self {
        Self {
            runner,
            os: os.into(),
        }
    }

    #[instrument(skip(self))]
    pub async fn probe(&self, name: &str) -> ServiceReport {
        to_report(name, interpreter::inspect(&self.runner, &self.os, name).await)
    }
}
