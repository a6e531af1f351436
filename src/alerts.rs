//! Cooldown-gated alert generation
//!
//! Every check the scheduler produces is passed to [`AlertGenerator`].
//! Non-running checks create an [`Alert`] row unless the same
//! (host, service) pair alerted within the cooldown window. Cooldowns live
//! in process memory only and reset on restart.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};

use crate::models::{Alert, Host, HostId, NewAlert, Service, ServiceCheck, ServiceId, ServiceStatus};
use crate::storage::{StorageResult, Store};

/// Delivery channel every alert is tagged with
pub const ALERT_CHANNEL: &str = "telegram";

/// Default minimum spacing between two alerts for the same pair
pub const DEFAULT_COOLDOWN: std::time::Duration = std::time::Duration::from_secs(5 * 60);

type CooldownKey = (HostId, ServiceId);

/// Result of trying to claim the right to alert for a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The caller may alert; `previous` is the timestamp it replaced
    Granted { previous: Option<DateTime<Utc>> },

    /// The pair alerted at `last`, still inside the window
    Suppressed { last: DateTime<Utc> },
}

/// Last-alert timestamps per (host, service), shared by all check tasks
#[derive(Debug)]
pub struct CooldownTracker {
    window: Duration,
    last_alert: RwLock<HashMap<CooldownKey, DateTime<Utc>>>,
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl CooldownTracker {
    pub fn new(window: std::time::Duration) -> Self {
        Self {
            window: Duration::from_std(window).unwrap_or(Duration::MAX),
            last_alert: RwLock::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn within_window(&self, last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(last) < self.window
    }

    /// Whether the pair alerted less than one window before `now`
    pub async fn is_cooling(&self, host: HostId, service: ServiceId, now: DateTime<Utc>) -> bool {
        self.last_alert
            .read()
            .await
            .get(&(host, service))
            .is_some_and(|last| self.within_window(*last, now))
    }

    pub async fn last_alert(&self, host: HostId, service: ServiceId) -> Option<DateTime<Utc>> {
        self.last_alert.read().await.get(&(host, service)).copied()
    }

    /// Record `now` as the pair's last alert unless it is still cooling
    ///
    /// Check and write happen under one write lock, so two concurrent
    /// callers can never both be granted inside one window.
    pub async fn try_reserve(
        &self,
        host: HostId,
        service: ServiceId,
        now: DateTime<Utc>,
    ) -> Reservation {
        let mut last_alert = self.last_alert.write().await;
        match last_alert.get(&(host, service)) {
            Some(last) if self.within_window(*last, now) => Reservation::Suppressed { last: *last },
            _ => Reservation::Granted {
                previous: last_alert.insert((host, service), now),
            },
        }
    }

    /// Undo a reservation whose alert could not be persisted
    pub async fn restore(
        &self,
        host: HostId,
        service: ServiceId,
        previous: Option<DateTime<Utc>>,
    ) {
        let mut last_alert = self.last_alert.write().await;
        match previous {
            Some(previous) => last_alert.insert((host, service), previous),
            None => last_alert.remove(&(host, service)),
        };
    }
}

/// Human-readable alert text
pub fn format_message(host: &Host, service: &Service, check: &ServiceCheck) -> String {
    let mut message = format!(
        "🚨 Service '{}' on host '{}' is {}",
        service.display_name, host.name, check.status
    );
    if let Some(error) = check.error_message.as_deref().filter(|e| !e.is_empty()) {
        message.push_str(&format!("\nError: {error}"));
    }
    message
}

/// Decides whether a check produces an alert and persists it
#[derive(Clone)]
pub struct AlertGenerator {
    store: Store,
    cooldowns: Arc<CooldownTracker>,
}

impl AlertGenerator {
    pub fn new(store: Store, cooldowns: Arc<CooldownTracker>) -> Self {
        Self { store, cooldowns }
    }

    pub fn cooldowns(&self) -> &Arc<CooldownTracker> {
        &self.cooldowns
    }

    pub async fn evaluate(
        &self,
        host: &Host,
        service: &Service,
        check: &ServiceCheck,
    ) -> StorageResult<Option<Alert>> {
        self.evaluate_at(host, service, check, Utc::now()).await
    }

    /// Evaluate `check` as if the current time were `now`
    ///
    /// Returns the created alert, or `None` when the service is running or
    /// the pair is cooling down. A failed write releases the reservation.
    #[instrument(skip_all, fields(host = %host.name, service = %service.name, status = %check.status))]
    pub async fn evaluate_at(
        &self,
        host: &Host,
        service: &Service,
        check: &ServiceCheck,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Alert>> {
        if check.status == ServiceStatus::Running {
            return Ok(None);
        }

        // read lock first; most evaluations of a failing service are suppressed
        if self.cooldowns.is_cooling(host.id, service.id, now).await {
            debug!("alert suppressed by cooldown");
            return Ok(None);
        }

        let previous = match self.cooldowns.try_reserve(host.id, service.id, now).await {
            Reservation::Granted { previous } => previous,
            Reservation::Suppressed { .. } => {
                debug!("alert suppressed by cooldown");
                return Ok(None);
            }
        };

        let alert = NewAlert {
            service_id: service.id,
            host_id: host.id,
            status: check.status,
            message: format_message(host, service, check),
            sent_via: ALERT_CHANNEL.to_string(),
            created_at: now,
        };

        match self.store.create_alert(alert).await {
            Ok(alert) => {
                info!("alert created: {}", alert.message);
                Ok(Some(alert))
            }
            Err(e) => {
                error!("failed to create alert: {}", e);
                self.cooldowns.restore(host.id, service.id, previous).await;
                Err(e)
            }
        }
    }
}
