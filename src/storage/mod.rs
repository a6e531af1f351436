//! Storage backends for hosts, services, checks and alerts
//!
//! This module provides a trait-based abstraction over the persistence
//! collaborator the monitoring engine works against.
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` trait allows swapping implementations
//! - **Async**: All operations are async so they can be awaited from scheduler tasks
//! - **Atomic identity**: every insert assigns its id and returns the stored row
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database with migrations
//! - **In-Memory**: No persistence, for testing or throwaway runs
//!
//! ## Usage
//!
//! ```no_run
//! use service_sentinel::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./sentinel.db").await?;
//!     let hosts = backend.list_hosts().await?;
//!     println!("{} hosts", hosts.len());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

pub use backend::{HealthStatus, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;

/// Shared handle to the configured backend
pub type Store = Arc<dyn StorageBackend>;
