//! Maps OS-specific command output to a normalized [`ServiceStatus`]
//!
//! A check is a short pipeline: the status query decides the status, and
//! only a running service gets the follow-up queries for process id,
//! resource usage and uptime. A failing follow-up step leaves its field
//! empty and never changes the status.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use tracing::{debug, trace};

use crate::models::{NewServiceCheck, ServiceId, ServiceStatus};

use super::executor::ExecError;

/// No control characters, and no leading `-` that a command would read as
/// an option
static SERVICE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^-\x00-\x1f\x7f][^\x00-\x1f\x7f]*$").expect("invalid service name regex")
});

/// Whether `name` can be quoted into a status command for `os`
///
/// Names are always quoted, so this only rejects what quoting cannot
/// protect. On Windows the PowerShell script sits inside a `cmd.exe`
/// double-quoted argument, where `"` ends the argument and `%` still
/// expands variables.
pub fn is_valid_service_name(os: OsFamily, name: &str) -> bool {
    SERVICE_NAME.is_match(name)
        && match os {
            OsFamily::Linux => true,
            OsFamily::Windows => !name.contains(['"', '%']),
        }
}

/// `value` as one single-quoted `sh` word
fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// `value` as a PowerShell single-quoted string
fn ps_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        // PowerShell also treats the typographic single quotes as quotes
        if matches!(c, '\'' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}') {
            quoted.push(c);
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

/// Operating-system families with a known status query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    Windows,
}

impl OsFamily {
    /// Case-insensitive lookup of a host's `os` label
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "linux" => Some(OsFamily::Linux),
            "windows" => Some(OsFamily::Windows),
            _ => None,
        }
    }

    /// The family this binary was built for
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "windows") {
            Some(OsFamily::Windows)
        } else if cfg!(target_os = "linux") {
            Some(OsFamily::Linux)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::Windows => "windows",
        }
    }
}

/// Auxiliary metrics of a running service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessInfo {
    pub pid: Option<u32>,
    pub memory_kb: Option<u64>,
    pub cpu_percent: Option<f64>,
    pub uptime_seconds: Option<u64>,
}

/// Resident memory and CPU usage of one process
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessUsage {
    pub memory_kb: u64,
    pub cpu_percent: f64,
}

/// Outcome of inspecting one service
#[derive(Debug, Clone, PartialEq)]
pub struct Inspection {
    pub status: ServiceStatus,
    pub info: Option<ProcessInfo>,
    pub error: Option<String>,
}

impl Inspection {
    pub fn unknown(error: impl Into<String>) -> Self {
        Self {
            status: ServiceStatus::Unknown,
            info: None,
            error: Some(error.into()),
        }
    }

    fn status(status: ServiceStatus) -> Self {
        Self {
            status,
            info: None,
            error: None,
        }
    }

    /// Build the check row for this inspection
    pub fn into_check(self, service_id: ServiceId, checked_at: DateTime<Utc>) -> NewServiceCheck {
        let mut check = NewServiceCheck::new(service_id, self.status, checked_at);
        check.error_message = self.error;
        if let Some(info) = self.info {
            check.pid = info.pid;
            check.memory_kb = info.memory_kb;
            check.cpu_percent = info.cpu_percent;
            check.uptime_seconds = info.uptime_seconds;
        }
        check
    }
}

/// Something that can run a shell command on the inspected machine
///
/// The hub runs commands through SSH, the agent runs them locally.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<String, ExecError>;

    /// Memory and CPU usage for `pid`, `None` if unavailable
    async fn process_usage(&self, os: OsFamily, pid: u32) -> Option<ProcessUsage> {
        let output = self.run(&usage_command(os, pid)).await.ok()?;
        match os {
            OsFamily::Linux => parse_ps_usage(&output),
            OsFamily::Windows => parse_windows_csv_usage(&output),
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Status query; it always exits zero so the state word reaches the parser
pub fn status_command(os: OsFamily, name: &str) -> String {
    match os {
        OsFamily::Linux => format!("systemctl is-active {} || true", sh_quote(name)),
        OsFamily::Windows => format!(
            r#"powershell -Command "Get-Service -Name {} | Select-Object -ExpandProperty Status""#,
            ps_quote(name)
        ),
    }
}

pub fn pid_command(os: OsFamily, name: &str) -> String {
    match os {
        OsFamily::Linux => format!("systemctl show -p MainPID --value {}", sh_quote(name)),
        OsFamily::Windows => format!(
            r#"powershell -Command "(Get-CimInstance Win32_Service | Where-Object Name -eq {}).ProcessId""#,
            ps_quote(name)
        ),
    }
}

pub fn usage_command(os: OsFamily, pid: u32) -> String {
    match os {
        OsFamily::Linux => format!("ps -p {pid} -o rss=,%cpu= 2>/dev/null"),
        OsFamily::Windows => format!(
            r#"powershell -Command "Get-Process -Id {pid} | Select-Object @{{N='WS';E={{$_.WS/1KB}}}},CPU | ConvertTo-Csv -NoTypeInformation""#
        ),
    }
}

pub fn active_since_command(name: &str) -> String {
    format!(
        "systemctl show -p ActiveEnterTimestamp --value {}",
        sh_quote(name)
    )
}

// ============================================================================
// Parsers
// ============================================================================

/// `systemctl is-active` output to status
pub fn parse_systemd_state(output: &str) -> ServiceStatus {
    match output.trim() {
        "active" => ServiceStatus::Running,
        "inactive" => ServiceStatus::Stopped,
        "failed" => ServiceStatus::Failed,
        "activating" | "deactivating" => ServiceStatus::Degraded,
        _ => ServiceStatus::Unknown,
    }
}

/// `Get-Service` status to status, case-insensitive
pub fn parse_windows_status(output: &str) -> ServiceStatus {
    match output.trim().to_ascii_lowercase().as_str() {
        "running" => ServiceStatus::Running,
        "stopped" => ServiceStatus::Stopped,
        "paused" => ServiceStatus::Degraded,
        _ => ServiceStatus::Unknown,
    }
}

/// A positive process id, `None` for `0`, empty or garbage output
pub fn parse_pid(output: &str) -> Option<u32> {
    output.trim().parse::<u32>().ok().filter(|pid| *pid > 0)
}

/// `ps -o rss=,%cpu=` output: resident KiB and CPU percent
pub fn parse_ps_usage(output: &str) -> Option<ProcessUsage> {
    let mut fields = output.split_whitespace();
    let memory_kb = fields.next()?.parse::<u64>().ok()?;
    let cpu_percent = fields.next()?.parse::<f64>().ok()?;
    Some(ProcessUsage {
        memory_kb,
        cpu_percent,
    })
}

/// Second line of `ConvertTo-Csv` output, `"WS","CPU"` in KiB and seconds
pub fn parse_windows_csv_usage(output: &str) -> Option<ProcessUsage> {
    let line = output.lines().nth(1)?.trim().trim_matches('"');
    let mut fields = line.split("\",\"");
    let memory = fields.next()?.trim().parse::<f64>().ok()?;
    let cpu_percent = fields.next()?.trim().parse::<f64>().ok()?;
    if !memory.is_finite() || memory < 0.0 {
        return None;
    }
    Some(ProcessUsage {
        memory_kb: memory as u64,
        cpu_percent,
    })
}

/// Seconds since `ActiveEnterTimestamp`, `0` when it cannot be parsed
///
/// Accepts `Mon 2006-01-02 15:04:05 UTC` (any weekday, UTC/GMT or a
/// numeric offset; other zone names are read as UTC) and `@<unix secs>`.
pub fn parse_active_enter(output: &str, now: DateTime<Utc>) -> u64 {
    parse_active_enter_timestamp(output.trim())
        .map(|since| (now - since).num_seconds().max(0) as u64)
        .unwrap_or(0)
}

fn parse_active_enter_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() || value == "n/a" {
        return None;
    }

    if let Some(epoch) = value.strip_prefix('@') {
        let secs = epoch.parse::<i64>().ok()?;
        return DateTime::from_timestamp(secs, 0);
    }

    let parts: Vec<&str> = value.split_whitespace().collect();
    let (date, time, zone) = match parts.as_slice() {
        [_weekday, date, time, zone] => (*date, *time, Some(*zone)),
        [_weekday, date, time] => (*date, *time, None),
        _ => return None,
    };

    let naive =
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S").ok()?;

    match zone {
        Some(zone) if zone.starts_with('+') || zone.starts_with('-') => {
            parse_offset(zone)?
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        }
        _ => Some(Utc.from_utc_datetime(&naive)),
    }
}

/// `+0200`, `-05:30` style numeric offsets
fn parse_offset(value: &str) -> Option<FixedOffset> {
    let (sign, rest) = match value.split_at_checked(1)? {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 {
        return None;
    }
    let hours = digits.get(..2)?.parse::<i32>().ok()?;
    let minutes = digits.get(2..)?.parse::<i32>().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

// ============================================================================
// Pipeline
// ============================================================================

/// Inspect service `name` on a machine whose OS label is `os`
pub async fn inspect(runner: &dyn CommandRunner, os: &str, name: &str) -> Inspection {
    let Some(family) = OsFamily::from_name(os) else {
        return Inspection::unknown(format!("unsupported OS: {os}"));
    };

    if !is_valid_service_name(family, name) {
        return Inspection::unknown(format!("invalid service name: {name:?}"));
    }

    let output = match runner.run(&status_command(family, name)).await {
        Ok(output) => output,
        Err(e) => {
            debug!("status query for {} failed: {}", name, e);
            return Inspection::unknown(format!("failed to check service: {e}"));
        }
    };

    let status = match family {
        OsFamily::Linux => parse_systemd_state(&output),
        OsFamily::Windows => parse_windows_status(&output),
    };
    trace!("{} reported as {}", name, status);

    let mut inspection = Inspection::status(status);
    if status == ServiceStatus::Running {
        inspection.info = Some(process_info(runner, family, name).await);
    }
    inspection
}

async fn process_info(runner: &dyn CommandRunner, os: OsFamily, name: &str) -> ProcessInfo {
    let mut info = ProcessInfo::default();

    info.pid = match runner.run(&pid_command(os, name)).await {
        Ok(output) => parse_pid(&output),
        Err(e) => {
            debug!("pid query for {} failed: {}", name, e);
            None
        }
    };

    if let Some(pid) = info.pid
        && let Some(usage) = runner.process_usage(os, pid).await
    {
        info.memory_kb = Some(usage.memory_kb);
        info.cpu_percent = Some(usage.cpu_percent);
    }

    if os == OsFamily::Linux {
        info.uptime_seconds = match runner.run(&active_since_command(name)).await {
            Ok(output) => Some(parse_active_enter(&output, Utc::now())),
            Err(e) => {
                debug!("uptime query for {} failed: {}", name, e);
                None
            }
        };
    }

    info
}
