//! Scripted executor for tests

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::executor::{ExecError, RemoteExecutor, SshTarget};

struct Rule {
    address: Option<String>,
    fragment: String,
    response: Result<String, ExecError>,
}

/// A [`RemoteExecutor`] that answers from a script and records every call
///
/// Rules are matched in insertion order by command substring, optionally
/// restricted to one host address. Unmatched commands return empty output.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Vec<Rule>,
    unreachable: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands containing `fragment` with `output` on every host
    pub fn respond(mut self, fragment: &str, output: &str) -> Self {
        self.rules.push(Rule {
            address: None,
            fragment: fragment.to_string(),
            response: Ok(output.to_string()),
        });
        self
    }

    /// Answer commands containing `fragment` with `output` on one host
    pub fn respond_on(mut self, address: &str, fragment: &str, output: &str) -> Self {
        self.rules.push(Rule {
            address: Some(address.to_string()),
            fragment: fragment.to_string(),
            response: Ok(output.to_string()),
        });
        self
    }

    /// Fail commands containing `fragment` on every host
    pub fn fail(mut self, fragment: &str, error: ExecError) -> Self {
        self.rules.push(Rule {
            address: None,
            fragment: fragment.to_string(),
            response: Err(error),
        });
        self
    }

    /// Every command to `address` fails like a refused connection
    pub fn unreachable(mut self, address: &str) -> Self {
        self.unreachable.insert(address.to_string());
        self
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `(address, command)` for every call so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }

    pub fn calls_for(&self, address: &str) -> usize {
        self.calls()
            .iter()
            .filter(|(called, _)| called == address)
            .count()
    }

    /// Highest number of calls that were running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lookup(&self, address: &str, command: &str) -> Result<String, ExecError> {
        if self.unreachable.contains(address) {
            return Err(ExecError::CommandFailed {
                code: Some(255),
                stderr: format!("ssh: connect to host {address} port 22: Connection refused"),
            });
        }

        self.rules
            .iter()
            .find(|rule| {
                rule.address.as_deref().is_none_or(|a| a == address)
                    && command.contains(&rule.fragment)
            })
            .map(|rule| rule.response.clone())
            .unwrap_or_else(|| Ok(String::new()))
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn execute(&self, target: &SshTarget, command: &str) -> Result<String, ExecError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((target.address.clone(), command.to_string()));

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.lookup(&target.address, command)
    }
}
