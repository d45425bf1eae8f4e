//! Subcommand orchestration: config resolution through deployment.
//!
//! Control flow is strictly linear and synchronous. Each step consumes
//! identifiers and credentials produced by the previous one, so there is
//! nothing to parallelize; a failure aborts the run and the re-run converges
//! thanks to the create-if-absent provisioning policy.
use crate::cli::{DeployArgs, InitWarehouseArgs, RunArgs, TransformArgs, UploadArgs};
use crate::cloud::arm::ArmClient;
use crate::cloud::CloudServices;
use crate::config::{AzureConfig, Resolver, WarehouseConfig};
use crate::dataset;
use crate::envfile::EnvFile;
use crate::pipeline::Deployer;
use crate::provision::Provisioner;
use crate::transform;
use crate::warehouse::{self, SnowflakeSession};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Full sequence: download, provision, upload, init warehouse, deploy,
/// optionally transform.
pub fn run_run(args: &RunArgs) -> Result<()> {
    let mut env_file = EnvFile::load(&args.env_file)?;
    let (azure, warehouse_config) = resolve_configs(&env_file)?;

    tracing::info!("starting pipeline initialization");
    let csv_path = dataset::ensure_dataset(&args.data_dir, &dataset::dataset_url())?;

    let arm = connect(&azure)?;
    let services = cloud_services(&arm);
    let provisioner = Provisioner::new(&services, &azure);

    let storage = provisioner.provision_storage(&mut env_file)?;
    provisioner.upload_dataset(&storage.sas_token, &csv_path)?;

    init_warehouse(&warehouse_config, &args.schema_script)?;

    provisioner.ensure_factory()?;
    let deployer = Deployer::new(&arm, &azure.resource_group, &azure.data_factory_name);
    let run = deployer.deploy_and_run(&azure, &storage.storage_key, &warehouse_config)?;
    println!("{}", run.run_id);

    if args.transform {
        transform::run_transformation(&args.project_dir, args.profiles_dir.as_deref())?;
    }

    tracing::info!("pipeline initialization completed");
    Ok(())
}

/// Download the dataset, bring the storage chain up, and upload the blob.
pub fn run_upload(args: &UploadArgs) -> Result<()> {
    let mut env_file = EnvFile::load(&args.env_file)?;
    let azure = resolve_azure(&env_file)?;

    let csv_path = dataset::ensure_dataset(&args.data_dir, &dataset::dataset_url())?;

    let arm = connect(&azure)?;
    let services = cloud_services(&arm);
    let provisioner = Provisioner::new(&services, &azure);

    let storage = provisioner.provision_storage(&mut env_file)?;
    provisioner.upload_dataset(&storage.sas_token, &csv_path)?;
    tracing::info!("upload completed");
    Ok(())
}

/// Create the warehouse scope and apply the raw schema script.
pub fn run_init_warehouse(args: &InitWarehouseArgs) -> Result<()> {
    let env_file = EnvFile::load(&args.env_file)?;
    let warehouse_config = Resolver::from_process_env(&env_file).warehouse()?;
    init_warehouse(&warehouse_config, &args.schema_script)
}

/// Provision the factory, register the pipeline graph, and trigger a run.
pub fn run_deploy(args: &DeployArgs) -> Result<()> {
    let env_file = EnvFile::load(&args.env_file)?;
    let (azure, warehouse_config) = resolve_configs(&env_file)?;

    let arm = connect(&azure)?;
    let services = cloud_services(&arm);
    let provisioner = Provisioner::new(&services, &azure);
    provisioner.ensure_factory()?;

    // Keys are needed for the blob linked service regardless of how the
    // storage account came to exist.
    let keys = services
        .storage
        .list_keys(&azure.resource_group, &azure.storage_account)
        .with_context(|| format!("retrieve keys for storage account {}", azure.storage_account))?;
    let storage_key = keys
        .into_iter()
        .next()
        .with_context(|| format!("storage account {} returned no access keys", azure.storage_account))?;

    let deployer = Deployer::new(&arm, &azure.resource_group, &azure.data_factory_name);
    let run = deployer.deploy_and_run(&azure, &storage_key, &warehouse_config)?;
    println!("{}", run.run_id);
    Ok(())
}

/// Run the external transformation tool only.
pub fn run_transform(args: &TransformArgs) -> Result<()> {
    transform::run_transformation(&args.project_dir, args.profiles_dir.as_deref())
}

fn resolve_configs(env_file: &EnvFile) -> Result<(AzureConfig, WarehouseConfig)> {
    let resolver = Resolver::from_process_env(env_file);
    Ok((resolver.azure()?, resolver.warehouse()?))
}

fn resolve_azure(env_file: &EnvFile) -> Result<AzureConfig> {
    Resolver::from_process_env(env_file).azure()
}

fn connect(azure: &AzureConfig) -> Result<ArmClient> {
    ArmClient::connect(
        &azure.tenant_id,
        &azure.client_id,
        &azure.client_secret,
        &azure.subscription_id,
    )
}

fn cloud_services(arm: &ArmClient) -> CloudServices<'_> {
    CloudServices {
        resource_groups: arm,
        storage: arm,
        blobs: arm,
        factories: arm,
    }
}

fn init_warehouse(config: &WarehouseConfig, schema_script: &Path) -> Result<()> {
    let script = fs::read_to_string(schema_script)
        .with_context(|| format!("read schema script {}", schema_script.display()))?;

    let mut session = SnowflakeSession::connect(config)?;
    warehouse::establish_scope(&mut session, config)?;

    let report = warehouse::run_script(&mut session, &script);
    if report.failures.is_empty() {
        tracing::info!("schema script applied: {} statements", report.attempted);
    } else {
        // Partial application is accepted; the failures are already logged.
        tracing::warn!(
            "schema script applied with {} failed of {} statements: {}",
            report.failures.len(),
            report.attempted,
            serde_json::to_string(&report.failures).unwrap_or_default()
        );
    }

    if let Err(err) = session.close() {
        tracing::warn!("failed to close warehouse session: {err:#}");
    }
    Ok(())
}
