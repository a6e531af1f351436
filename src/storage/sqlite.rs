//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `StorageBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//! - **Cascading deletes**: foreign keys are enforced, deleting a host
//!   removes its services, checks and alerts
//!
//! Timestamps are stored as Unix milliseconds, so values read back are
//! truncated to millisecond precision.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use crate::models::{
    Alert, ConnectionStatus, Host, HostId, JumpHost, NewAlert, NewHost, NewService,
    NewServiceCheck, Service, ServiceCheck, ServiceId,
};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};

const HOST_COLUMNS: &str = "id, name, address, port, os, monitoring_mode, ssh_user, ssh_key_path, \
     jump_hosts, agent_token, check_interval_secs, connection_status, enabled, last_seen, created_at";

const SERVICE_COLUMNS: &str = "id, host_id, name, display_name, description, enabled, created_at";

const CHECK_COLUMNS: &str = "id, service_id, status, response_time_ms, error_message, pid, \
     memory_kb, cpu_percent, uptime_seconds, checked_at";

const ALERT_COLUMNS: &str = "id, service_id, host_id, status, message, sent_via, acknowledged, \
     archived, created_at, acknowledged_at, archived_at";

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for concurrent access (WAL mode, foreign keys)
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    /// Current time at the precision the database keeps
    fn now_millis() -> DateTime<Utc> {
        Self::truncate(Utc::now())
    }

    fn truncate(dt: DateTime<Utc>) -> DateTime<Utc> {
        Self::millis_to_timestamp(Self::timestamp_to_millis(&dt))
    }

    fn host_from_row(row: &SqliteRow) -> StorageResult<Host> {
        let jump_hosts: String = row.try_get("jump_hosts")?;
        let jump_hosts: Vec<JumpHost> = serde_json::from_str(&jump_hosts).map_err(|e| {
            StorageError::SerializationError(format!("failed to decode jump hosts: {e}"))
        })?;

        Ok(Host {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            address: row.try_get("address")?,
            port: row.try_get::<i64, _>("port")? as u16,
            os: row.try_get("os")?,
            mode: row.try_get::<String, _>("monitoring_mode")?.parse()?,
            ssh_user: row.try_get("ssh_user")?,
            ssh_key_path: row.try_get("ssh_key_path")?,
            jump_hosts,
            agent_token: row.try_get("agent_token")?,
            check_interval_secs: row
                .try_get::<Option<i64>, _>("check_interval_secs")?
                .map(|v| v as u64),
            connection_status: row.try_get::<String, _>("connection_status")?.parse()?,
            enabled: row.try_get("enabled")?,
            last_seen: row
                .try_get::<Option<i64>, _>("last_seen")?
                .map(Self::millis_to_timestamp),
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
        })
    }

    fn service_from_row(row: &SqliteRow) -> StorageResult<Service> {
        Ok(Service {
            id: row.try_get("id")?,
            host_id: row.try_get("host_id")?,
            name: row.try_get("name")?,
            display_name: row.try_get("display_name")?,
            description: row.try_get("description")?,
            enabled: row.try_get("enabled")?,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
        })
    }

    fn check_from_row(row: &SqliteRow) -> StorageResult<ServiceCheck> {
        Ok(ServiceCheck {
            id: row.try_get("id")?,
            service_id: row.try_get("service_id")?,
            status: row.try_get::<String, _>("status")?.parse()?,
            response_time_ms: row
                .try_get::<Option<i64>, _>("response_time_ms")?
                .map(|v| v as u64),
            error_message: row.try_get("error_message")?,
            pid: row.try_get::<Option<i64>, _>("pid")?.map(|v| v as u32),
            memory_kb: row.try_get::<Option<i64>, _>("memory_kb")?.map(|v| v as u64),
            cpu_percent: row.try_get("cpu_percent")?,
            uptime_seconds: row
                .try_get::<Option<i64>, _>("uptime_seconds")?
                .map(|v| v as u64),
            checked_at: Self::millis_to_timestamp(row.try_get("checked_at")?),
        })
    }

    fn alert_from_row(row: &SqliteRow) -> StorageResult<Alert> {
        Ok(Alert {
            id: row.try_get("id")?,
            service_id: row.try_get("service_id")?,
            host_id: row.try_get("host_id")?,
            status: row.try_get::<String, _>("status")?.parse()?,
            message: row.try_get("message")?,
            sent_via: row.try_get("sent_via")?,
            acknowledged: row.try_get("acknowledged")?,
            archived: row.try_get("archived")?,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
            acknowledged_at: row
                .try_get::<Option<i64>, _>("acknowledged_at")?
                .map(Self::millis_to_timestamp),
            archived_at: row
                .try_get::<Option<i64>, _>("archived_at")?
                .map(Self::millis_to_timestamp),
        })
    }

    async fn fetch_host_where(&self, clause: &str, value: &str) -> StorageResult<Option<Host>> {
        let sql = format!("SELECT {HOST_COLUMNS} FROM hosts WHERE {clause} = ?");
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::host_from_row).transpose()
    }

    fn ensure_updated(rows: u64, what: String) -> StorageResult<()> {
        if rows == 0 {
            return Err(StorageError::NotFound(what));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self, host), fields(host = %host.name))]
    async fn create_host(&self, host: NewHost) -> StorageResult<Host> {
        let created_at = Self::now_millis();
        let jump_hosts = serde_json::to_string(&host.jump_hosts).map_err(|e| {
            StorageError::SerializationError(format!("failed to encode jump hosts: {e}"))
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO hosts (
                name, address, port, os, monitoring_mode, ssh_user, ssh_key_path,
                jump_hosts, agent_token, check_interval_secs, connection_status,
                enabled, last_seen, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?)
            "#,
        )
        .bind(&host.name)
        .bind(&host.address)
        .bind(host.port as i64)
        .bind(&host.os)
        .bind(host.mode.as_str())
        .bind(&host.ssh_user)
        .bind(&host.ssh_key_path)
        .bind(jump_hosts)
        .bind(&host.agent_token)
        .bind(host.check_interval_secs.map(|v| v as i64))
        .bind(ConnectionStatus::NotConnected.as_str())
        .bind(host.enabled)
        .bind(Self::timestamp_to_millis(&created_at))
        .execute(&self.pool)
        .await?;

        debug!("created host {}", host.name);

        Ok(Host {
            id: result.last_insert_rowid(),
            name: host.name,
            address: host.address,
            port: host.port,
            os: host.os,
            mode: host.mode,
            ssh_user: host.ssh_user,
            ssh_key_path: host.ssh_key_path,
            jump_hosts: host.jump_hosts,
            agent_token: host.agent_token,
            check_interval_secs: host.check_interval_secs,
            connection_status: ConnectionStatus::NotConnected,
            enabled: host.enabled,
            last_seen: None,
            created_at,
        })
    }

    async fn get_host(&self, id: HostId) -> StorageResult<Option<Host>> {
        let sql = format!("SELECT {HOST_COLUMNS} FROM hosts WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::host_from_row).transpose()
    }

    async fn find_host_by_name(&self, name: &str) -> StorageResult<Option<Host>> {
        self.fetch_host_where("name", name).await
    }

    async fn find_host_by_token(&self, token: &str) -> StorageResult<Option<Host>> {
        self.fetch_host_where("agent_token", token).await
    }

    async fn list_hosts(&self) -> StorageResult<Vec<Host>> {
        let sql = format!("SELECT {HOST_COLUMNS} FROM hosts ORDER BY id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(Self::host_from_row).collect()
    }

    async fn touch_host(&self, id: HostId, at: DateTime<Utc>) -> StorageResult<()> {
        let result = sqlx::query("UPDATE hosts SET last_seen = ? WHERE id = ?")
            .bind(Self::timestamp_to_millis(&at))
            .bind(id)
            .execute(&self.pool)
            .await?;

        Self::ensure_updated(result.rows_affected(), format!("host {id}"))
    }

    async fn record_report(&self, id: HostId, at: DateTime<Utc>) -> StorageResult<()> {
        let result =
            sqlx::query("UPDATE hosts SET last_seen = ?, connection_status = ? WHERE id = ?")
                .bind(Self::timestamp_to_millis(&at))
                .bind(ConnectionStatus::Connected.as_str())
                .bind(id)
                .execute(&self.pool)
                .await?;

        Self::ensure_updated(result.rows_affected(), format!("host {id}"))
    }

    async fn set_connection_status(
        &self,
        id: HostId,
        status: ConnectionStatus,
    ) -> StorageResult<()> {
        let result = sqlx::query("UPDATE hosts SET connection_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Self::ensure_updated(result.rows_affected(), format!("host {id}"))
    }

    async fn mark_idle_if_stale(&self, id: HostId, cutoff: DateTime<Utc>) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE hosts SET connection_status = ?
            WHERE id = ? AND connection_status = ? AND last_seen IS NOT NULL AND last_seen < ?
            "#,
        )
        .bind(ConnectionStatus::Idle.as_str())
        .bind(id)
        .bind(ConnectionStatus::Connected.as_str())
        .bind(Self::timestamp_to_millis(&cutoff))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn delete_host(&self, id: HostId) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM hosts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Self::ensure_updated(result.rows_affected(), format!("host {id}"))
    }

    async fn create_service(&self, service: NewService) -> StorageResult<Service> {
        let created_at = Self::now_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO services (host_id, name, display_name, description, enabled, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(service.host_id)
        .bind(&service.name)
        .bind(&service.display_name)
        .bind(&service.description)
        .bind(service.enabled)
        .bind(Self::timestamp_to_millis(&created_at))
        .execute(&self.pool)
        .await?;

        Ok(Service {
            id: result.last_insert_rowid(),
            host_id: service.host_id,
            name: service.name,
            display_name: service.display_name,
            description: service.description,
            enabled: service.enabled,
            created_at,
        })
    }

    async fn list_services(&self, host_id: HostId) -> StorageResult<Vec<Service>> {
        let sql = format!("SELECT {SERVICE_COLUMNS} FROM services WHERE host_id = ? ORDER BY id ASC");
        let rows = sqlx::query(&sql)
            .bind(host_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::service_from_row).collect()
    }

    async fn find_service(&self, host_id: HostId, name: &str) -> StorageResult<Option<Service>> {
        let sql = format!("SELECT {SERVICE_COLUMNS} FROM services WHERE host_id = ? AND name = ?");
        let row = sqlx::query(&sql)
            .bind(host_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::service_from_row).transpose()
    }

    async fn insert_check(&self, check: NewServiceCheck) -> StorageResult<ServiceCheck> {
        let mut check = check;
        check.checked_at = Self::truncate(check.checked_at);

        let result = sqlx::query(
            r#"
            INSERT INTO service_checks (
                service_id, status, response_time_ms, error_message, pid,
                memory_kb, cpu_percent, uptime_seconds, checked_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(check.service_id)
        .bind(check.status.as_str())
        .bind(check.response_time_ms.map(|v| v as i64))
        .bind(&check.error_message)
        .bind(check.pid.map(|v| v as i64))
        .bind(check.memory_kb.map(|v| v as i64))
        .bind(check.cpu_percent)
        .bind(check.uptime_seconds.map(|v| v as i64))
        .bind(Self::timestamp_to_millis(&check.checked_at))
        .execute(&self.pool)
        .await?;

        Ok(check.into_check(result.last_insert_rowid()))
    }

    async fn latest_check(&self, service_id: ServiceId) -> StorageResult<Option<ServiceCheck>> {
        Ok(self.check_history(service_id, 1).await?.into_iter().next())
    }

    async fn check_history(
        &self,
        service_id: ServiceId,
        limit: usize,
    ) -> StorageResult<Vec<ServiceCheck>> {
        let sql = format!(
            r#"
            SELECT {CHECK_COLUMNS} FROM service_checks
            WHERE service_id = ?
            ORDER BY checked_at DESC, id DESC
            LIMIT ?
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(service_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::check_from_row).collect()
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn prune_checks(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM service_checks WHERE checked_at < ?")
            .bind(Self::timestamp_to_millis(&before))
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} old service checks", deleted);
        Ok(deleted)
    }

    async fn create_alert(&self, alert: NewAlert) -> StorageResult<Alert> {
        let mut alert = alert;
        alert.created_at = Self::truncate(alert.created_at);

        let result = sqlx::query(
            r#"
            INSERT INTO alerts (service_id, host_id, status, message, sent_via, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(alert.service_id)
        .bind(alert.host_id)
        .bind(alert.status.as_str())
        .bind(&alert.message)
        .bind(&alert.sent_via)
        .bind(Self::timestamp_to_millis(&alert.created_at))
        .execute(&self.pool)
        .await?;

        Ok(alert.into_alert(result.last_insert_rowid()))
    }

    async fn recent_alerts(&self, limit: usize) -> StorageResult<Vec<Alert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts ORDER BY created_at DESC, id DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::alert_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
