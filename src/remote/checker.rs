//! Pull-mode check of one service on one host

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

use crate::models::{Host, NewServiceCheck, Service};

use super::executor::{ExecError, RemoteExecutor, SshTarget};
use super::interpreter::{self, CommandRunner};

/// Runs interpreter commands on one host through a [`RemoteExecutor`]
struct RemoteSession<'a> {
    executor: &'a dyn RemoteExecutor,
    target: SshTarget,
}

#[async_trait]
impl CommandRunner for RemoteSession<'_> {
    async fn run(&self, command: &str) -> Result<String, ExecError> {
        self.executor.execute(&self.target, command).await
    }
}

/// Composes the executor and the interpreter for pull and hybrid hosts
#[derive(Clone)]
pub struct PullChecker {
    executor: Arc<dyn RemoteExecutor>,
}

impl PullChecker {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self { executor }
    }

    /// Check `service` on `host`
    ///
    /// Never fails: transport errors become an `unknown` check carrying the
    /// error text. The response time covers every command of the check.
    #[instrument(skip_all, fields(host = %host.name, service = %service.name))]
    pub async fn check(&self, host: &Host, service: &Service) -> NewServiceCheck {
        let session = RemoteSession {
            executor: self.executor.as_ref(),
            target: SshTarget::from_host(host),
        };

        let started = Instant::now();
        let inspection = interpreter::inspect(&session, &host.os, &service.name).await;
        let elapsed = started.elapsed();

        debug!(
            "{} is {} ({} ms)",
            service.name,
            inspection.status,
            elapsed.as_millis()
        );

        let mut check = inspection.into_check(service.id, Utc::now());
        check.response_time_ms = Some(elapsed.as_millis() as u64);
        check
    }
}
