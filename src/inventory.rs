//! Start-up sync of configured hosts and services into storage
//!
//! Only creates: a host is added when no host has its name, and a service
//! is added when its host has no service of that name. Rows that already
//! exist are left untouched, so operator edits survive restarts.

use tracing::{debug, info, instrument, warn};

use crate::config::HostDefinition;
use crate::models::{MonitoringMode, NewHost, NewService};
use crate::storage::{StorageError, StorageResult, Store};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub hosts_created: usize,
    pub services_created: usize,
}

fn new_host(definition: &HostDefinition) -> NewHost {
    // only push hosts authenticate with a token
    let agent_token = match (&definition.agent_token, definition.mode) {
        (Some(_), MonitoringMode::Push) | (None, _) => definition.agent_token.clone(),
        (Some(_), mode) => {
            warn!("ignoring agent_token of {mode} host {}", definition.name);
            None
        }
    };

    NewHost {
        name: definition.name.clone(),
        address: definition.address.clone(),
        port: definition.port,
        os: definition.os.clone(),
        mode: definition.mode,
        ssh_user: definition.ssh_user.clone(),
        ssh_key_path: definition.ssh_key_path.clone(),
        jump_hosts: definition.jump_hosts.clone(),
        agent_token,
        check_interval_secs: definition.check_interval_secs,
        enabled: definition.enabled,
    }
}

#[instrument(skip_all, fields(hosts = definitions.len()))]
pub async fn sync(store: &Store, definitions: &[HostDefinition]) -> StorageResult<SyncSummary> {
    let mut summary = SyncSummary::default();

    for definition in definitions {
        let host = match store.find_host_by_name(&definition.name).await? {
            Some(host) => host,
            None => {
                let host = store.create_host(new_host(definition)).await?;
                info!("created host {} from config", host.name);
                summary.hosts_created += 1;
                host
            }
        };

        for service in &definition.services {
            if store.find_service(host.id, &service.name).await?.is_some() {
                debug!("service {} on {} already exists", service.name, host.name);
                continue;
            }

            let mut new_service = NewService::named(host.id, &service.name);
            if let Some(display_name) = &service.display_name {
                new_service = new_service.with_display_name(display_name);
            }
            new_service.description = service.description.clone();
            new_service.enabled = service.enabled;

            match store.create_service(new_service).await {
                Ok(_) => summary.services_created += 1,
                Err(StorageError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }
    }

    info!(
        "inventory sync: {} hosts, {} services created",
        summary.hosts_created, summary.services_created
    );
    Ok(summary)
}
