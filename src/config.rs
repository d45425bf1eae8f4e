//! Typed configuration bundles resolved from the environment.
//!
//! Resolution is all-or-nothing per bundle: every missing key is collected
//! and reported in a single error, so one failed run names the full set of
//! keys to fix rather than the first one hit.
use crate::envfile::EnvFile;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

/// Service-principal credentials plus the resource names the run manages.
#[derive(Clone, Debug)]
pub struct AzureConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub storage_account: String,
    pub container_name: String,
    pub data_factory_name: String,
    pub blob_name: String,
}

/// Warehouse connection target.
#[derive(Clone, Debug)]
pub struct WarehouseConfig {
    pub account: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub warehouse: String,
    pub schema: String,
}

/// Key lookup over process-environment overrides layered on the env file.
pub struct Resolver<'a> {
    env_file: &'a EnvFile,
    overrides: BTreeMap<String, String>,
}

impl<'a> Resolver<'a> {
    /// Resolver for production use: process environment wins over the file.
    pub fn from_process_env(env_file: &'a EnvFile) -> Self {
        Self {
            env_file,
            overrides: std::env::vars().collect(),
        }
    }

    /// Resolver with an explicit override map, bypassing the process
    /// environment entirely.
    pub fn with_overrides(env_file: &'a EnvFile, overrides: BTreeMap<String, String>) -> Self {
        Self {
            env_file,
            overrides,
        }
    }

    fn lookup(&self, key: &str) -> Option<String> {
        self.overrides
            .get(key)
            .cloned()
            .filter(|value| !value.is_empty())
            .or_else(|| self.env_file.get(key).filter(|value| !value.is_empty()))
    }

    pub fn azure(&self) -> Result<AzureConfig> {
        let mut keys = BundleKeys::new(self);
        let config = AzureConfig {
            tenant_id: keys.require("AZURE_TENANT"),
            client_id: keys.require("AZURE_APP_ID"),
            client_secret: keys.require("AZURE_PASSWORD"),
            subscription_id: keys.require("AZURE_SUBSCRIPTION_ID"),
            resource_group: keys.require("AZURE_RESOURCE_GROUP"),
            storage_account: keys.require("AZURE_STORAGE_ACCOUNT"),
            container_name: keys.require("AZURE_CONTAINER_NAME"),
            data_factory_name: keys.require("AZURE_DATAFACTORY_NAME"),
            blob_name: keys.require("AZURE_BLOB_NAME"),
        };
        keys.finish("azure")?;
        Ok(config)
    }

    pub fn warehouse(&self) -> Result<WarehouseConfig> {
        let mut keys = BundleKeys::new(self);
        let config = WarehouseConfig {
            account: keys.require("SNOWFLAKE_ACCOUNT"),
            user: keys.require("SNOWFLAKE_USER"),
            password: keys.require("SNOWFLAKE_PASSWORD"),
            database: keys.require("SNOWFLAKE_DATABASE"),
            warehouse: keys.require("SNOWFLAKE_WAREHOUSE"),
            schema: keys.require("SNOWFLAKE_SCHEMA"),
        };
        keys.finish("warehouse")?;
        Ok(config)
    }
}

/// Collects missing key names across one bundle before failing once.
struct BundleKeys<'a, 'b> {
    resolver: &'b Resolver<'a>,
    missing: Vec<&'static str>,
}

impl<'a, 'b> BundleKeys<'a, 'b> {
    fn new(resolver: &'b Resolver<'a>) -> Self {
        Self {
            resolver,
            missing: Vec::new(),
        }
    }

    fn require(&mut self, key: &'static str) -> String {
        match self.resolver.lookup(key) {
            Some(value) => value,
            None => {
                self.missing.push(key);
                String::new()
            }
        }
    }

    fn finish(self, bundle: &str) -> Result<()> {
        if self.missing.is_empty() {
            return Ok(());
        }
        Err(anyhow!(
            "missing required configuration keys for the {bundle} bundle: {}",
            self.missing.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn env_file_with(content: &str) -> (tempfile::TempDir, EnvFile) {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join(".env");
        fs::write(&path, content).expect("seed env file");
        let env_file = EnvFile::load(&path).expect("load env file");
        (dir, env_file)
    }

    #[test]
    fn missing_keys_are_aggregated_into_one_error() {
        let (_dir, env_file) = env_file_with(
            "SNOWFLAKE_ACCOUNT=acct\nSNOWFLAKE_USER=alice\nSNOWFLAKE_PASSWORD=pw\nSNOWFLAKE_DATABASE=db\n",
        );
        let resolver = Resolver::with_overrides(&env_file, BTreeMap::new());

        let err = resolver.warehouse().expect_err("two keys are missing");
        let message = err.to_string();
        assert!(message.contains("SNOWFLAKE_WAREHOUSE"), "{message}");
        assert!(message.contains("SNOWFLAKE_SCHEMA"), "{message}");
        assert!(!message.contains("SNOWFLAKE_ACCOUNT"), "{message}");
    }

    #[test]
    fn overrides_win_over_file_entries() {
        let (_dir, env_file) = env_file_with("SNOWFLAKE_ACCOUNT=from-file\n");
        let overrides: BTreeMap<String, String> =
            [("SNOWFLAKE_ACCOUNT".to_string(), "from-env".to_string())]
                .into_iter()
                .collect();
        let resolver = Resolver::with_overrides(&env_file, overrides);

        assert_eq!(resolver.lookup("SNOWFLAKE_ACCOUNT").as_deref(), Some("from-env"));
    }

    #[test]
    fn empty_values_count_as_missing() {
        let (_dir, env_file) = env_file_with("SNOWFLAKE_ACCOUNT=\"\"\n");
        let resolver = Resolver::with_overrides(&env_file, BTreeMap::new());
        assert_eq!(resolver.lookup("SNOWFLAKE_ACCOUNT"), None);
    }

    #[test]
    fn complete_bundle_resolves() {
        let (_dir, env_file) = env_file_with(
            "SNOWFLAKE_ACCOUNT=acct\nSNOWFLAKE_USER=alice\nSNOWFLAKE_PASSWORD=pw\n\
             SNOWFLAKE_DATABASE=db\nSNOWFLAKE_WAREHOUSE=wh\nSNOWFLAKE_SCHEMA=RAW\n",
        );
        let resolver = Resolver::with_overrides(&env_file, BTreeMap::new());

        let config = resolver.warehouse().expect("bundle is complete");
        assert_eq!(config.account, "acct");
        assert_eq!(config.schema, "RAW");
    }
}
