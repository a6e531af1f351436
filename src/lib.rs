//! Service liveness monitoring
//!
//! The hub checks named OS services on a fleet of hosts, either by running
//! commands over SSH (pull) or by reading what each host's agent reported
//! (push), and raises cooldown-gated alerts for anything not running.

pub mod agent;
pub mod alerts;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod ingest;
pub mod inventory;
pub mod models;
pub mod remote;
pub mod scheduler;
pub mod storage;
pub mod util;
