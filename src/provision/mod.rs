//! Idempotent provisioning of the storage and factory chain.
//!
//! Every creation is gated by a probe, so re-running against a partially
//! provisioned subscription converges without side effects: existing
//! resources are confirmed, missing ones are created, and nothing is ever
//! rolled back (re-runs are the recovery mechanism).
use crate::cloud::{sas, CloudServices, ProvisioningResult, ResourceDescriptor, ResourceKind};
use crate::config::AzureConfig;
use crate::envfile::EnvFile;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

pub mod probe;

#[cfg(test)]
#[path = "provision_tests.rs"]
mod tests;

pub const DEFAULT_REGION: &str = "uaenorth";
pub const SAS_TOKEN_KEY: &str = "AZURE_SAS_TOKEN";
pub const SAS_VALIDITY_DAYS: i64 = 10;

/// Fixed settling delay after factory creation; the control plane needs time
/// before the factory accepts dependent registrations. A heuristic, not a
/// completion guarantee.
pub const FACTORY_SETTLE: Duration = Duration::from_secs(30);

/// Storage-chain outputs consumed by upload and deployment.
pub struct StorageProvisioning {
    pub results: Vec<ProvisioningResult>,
    pub storage_key: String,
    pub sas_token: String,
}

pub struct Provisioner<'a> {
    services: &'a CloudServices<'a>,
    config: &'a AzureConfig,
    region: &'static str,
    factory_settle: Duration,
}

impl<'a> Provisioner<'a> {
    pub fn new(services: &'a CloudServices<'a>, config: &'a AzureConfig) -> Self {
        Self {
            services,
            config,
            region: DEFAULT_REGION,
            factory_settle: FACTORY_SETTLE,
        }
    }

    pub fn with_factory_settle(mut self, settle: Duration) -> Self {
        self.factory_settle = settle;
        self
    }

    /// Steps 1-5: resource group, storage account, access keys, SAS token,
    /// container. Keys are retrieved on both creation branches; the SAS token
    /// is persisted so later runs reuse it before expiry.
    pub fn provision_storage(&self, env_file: &mut EnvFile) -> Result<StorageProvisioning> {
        let mut results = Vec::new();
        results.push(self.ensure_resource_group()?);
        results.push(self.ensure_storage_account()?);

        let keys = self
            .services
            .storage
            .list_keys(&self.config.resource_group, &self.config.storage_account)
            .with_context(|| {
                format!(
                    "retrieve keys for storage account {}",
                    self.config.storage_account
                )
            })?;
        let storage_key = keys.into_iter().next().ok_or_else(|| {
            anyhow!(
                "storage account {} returned no access keys",
                self.config.storage_account
            )
        })?;

        let sas_token =
            sas::generate_account_sas(&self.config.storage_account, &storage_key, SAS_VALIDITY_DAYS)?;
        env_file
            .upsert(SAS_TOKEN_KEY, &sas_token)
            .context("persist SAS token")?;
        tracing::info!("SAS token persisted to {}", env_file.path().display());

        results.push(self.ensure_container()?);

        Ok(StorageProvisioning {
            results,
            storage_key,
            sas_token,
        })
    }

    fn ensure_resource_group(&self) -> Result<ProvisioningResult> {
        let name = &self.config.resource_group;
        let existed = probe::resource_group_exists(self.services.resource_groups, name)?;
        if existed {
            tracing::info!("resource group {name} already exists");
        } else {
            tracing::info!("creating resource group {name}");
            self.services
                .resource_groups
                .create(name, self.region)
                .with_context(|| format!("create resource group {name}"))?;
        }
        Ok(ProvisioningResult {
            descriptor: ResourceDescriptor::new(
                ResourceKind::ResourceGroup,
                name,
                &self.config.subscription_id,
            ),
            existed_before: existed,
        })
    }

    fn ensure_storage_account(&self) -> Result<ProvisioningResult> {
        let name = &self.config.storage_account;
        let existed = probe::storage_account_exists(
            self.services.storage,
            &self.config.resource_group,
            name,
        )?;
        if existed {
            tracing::info!("storage account {name} already exists");
        } else {
            tracing::info!("creating storage account {name}");
            self.services
                .storage
                .create_blocking(&self.config.resource_group, name, self.region)
                .with_context(|| format!("create storage account {name}"))?;
        }
        Ok(ProvisioningResult {
            descriptor: ResourceDescriptor::new(
                ResourceKind::StorageAccount,
                name,
                &self.config.resource_group,
            ),
            existed_before: existed,
        })
    }

    fn ensure_container(&self) -> Result<ProvisioningResult> {
        let name = &self.config.container_name;
        let existed = probe::container_exists(
            self.services.blobs,
            &self.config.resource_group,
            &self.config.storage_account,
            name,
        )?;
        if existed {
            tracing::info!("container {name} already exists");
        } else {
            tracing::info!("creating container {name}");
            self.services
                .blobs
                .create_container(&self.config.resource_group, &self.config.storage_account, name)
                .with_context(|| format!("create container {name}"))?;
        }
        Ok(ProvisioningResult {
            descriptor: ResourceDescriptor::new(
                ResourceKind::Container,
                name,
                &self.config.storage_account,
            ),
            existed_before: existed,
        })
    }

    /// Step 6: factory via direct lookup. On creation, wait the settling
    /// delay before returning so dependent registrations find it usable.
    pub fn ensure_factory(&self) -> Result<ProvisioningResult> {
        let name = &self.config.data_factory_name;
        match probe::probe_factory(self.services.factories, &self.config.resource_group, name)? {
            crate::cloud::Probe::Found(descriptor) => {
                tracing::info!("data factory {name} already exists");
                Ok(ProvisioningResult {
                    descriptor,
                    existed_before: true,
                })
            }
            crate::cloud::Probe::NotFound => {
                tracing::info!("creating data factory {name}");
                self.services
                    .factories
                    .create(&self.config.resource_group, name, self.region)
                    .with_context(|| format!("create data factory {name}"))?;
                if !self.factory_settle.is_zero() {
                    tracing::info!(
                        "waiting {}s for data factory {name} to settle",
                        self.factory_settle.as_secs()
                    );
                    thread::sleep(self.factory_settle);
                }
                Ok(ProvisioningResult {
                    descriptor: ResourceDescriptor::new(
                        ResourceKind::Factory,
                        name,
                        &self.config.resource_group,
                    ),
                    existed_before: false,
                })
            }
        }
    }

    /// Upload the dataset body into the container, skipping the CSV header
    /// line so the raw table load needs no header handling.
    pub fn upload_dataset(&self, sas_token: &str, csv_path: &Path) -> Result<()> {
        let content = fs::read_to_string(csv_path)
            .with_context(|| format!("read dataset {}", csv_path.display()))?;
        let body = strip_header(&content);
        tracing::info!(
            "uploading {} to container {}",
            self.config.blob_name,
            self.config.container_name
        );
        self.services
            .blobs
            .upload(
                &self.config.storage_account,
                sas_token,
                &self.config.container_name,
                &self.config.blob_name,
                body.as_bytes(),
                true,
            )
            .with_context(|| format!("upload blob {}", self.config.blob_name))?;
        Ok(())
    }
}

fn strip_header(content: &str) -> &str {
    match content.split_once('\n') {
        Some((_, rest)) => rest,
        None => "",
    }
}
