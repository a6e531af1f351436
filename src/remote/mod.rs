//! Pull-mode checking: remote command execution and status interpretation
//!
//! - [`executor`]: runs one command on a host over `ssh`
//! - [`interpreter`]: turns systemd / Windows service output into a status
//! - [`checker`]: one (host, service) check with latency
//! - `mock`: scripted executor for tests (`test-util` feature)

pub mod checker;
pub mod executor;
pub mod interpreter;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use checker::PullChecker;
pub use executor::{ExecError, RemoteExecutor, SshExecutor, SshTarget};
pub use interpreter::{CommandRunner, Inspection, OsFamily};
