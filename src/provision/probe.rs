//! Existence probes backing the create-if-absent policy.
//!
//! List-based probes compare names against the scope's current listing; an
//! empty listing (or a scope that does not exist yet) reads as absent. The
//! factory probe is a direct lookup because the control plane signals its
//! absence with a not-found condition rather than an empty list.
use crate::cloud::{BlobApi, FactoryApi, Probe, ResourceGroupApi, StorageAccountApi};
use anyhow::Result;

pub fn resource_group_exists(api: &dyn ResourceGroupApi, name: &str) -> Result<bool> {
    Ok(api.list()?.iter().any(|existing| existing == name))
}

pub fn storage_account_exists(
    api: &dyn StorageAccountApi,
    resource_group: &str,
    name: &str,
) -> Result<bool> {
    Ok(api
        .list(resource_group)?
        .iter()
        .any(|existing| existing == name))
}

pub fn container_exists(
    api: &dyn BlobApi,
    resource_group: &str,
    account: &str,
    name: &str,
) -> Result<bool> {
    Ok(api
        .list_containers(resource_group, account)?
        .iter()
        .any(|existing| existing == name))
}

pub fn probe_factory(api: &dyn FactoryApi, resource_group: &str, name: &str) -> Result<Probe> {
    api.get(resource_group, name)
}
