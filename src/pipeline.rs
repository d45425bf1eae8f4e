//! Static pipeline definition and factory deployment.
//!
//! The definition is configuration, not computation: linked services,
//! datasets, and the copy activity are fixed JSON payloads registered under
//! stable names. Registration is declarative create-or-update, so deploying
//! twice converges to the same state.
use crate::cloud::FactoryApi;
use crate::config::{AzureConfig, WarehouseConfig};
use crate::warehouse::{RAW_SCHEMA, RAW_TABLE};
use anyhow::{Context, Result};
use serde_json::{json, Value};

pub const BLOB_LINKED_SERVICE: &str = "AzureBlobStorage";
pub const WAREHOUSE_LINKED_SERVICE: &str = "SnowflakeDB";
pub const SOURCE_DATASET: &str = "SalesCsv";
pub const SINK_DATASET: &str = "RawSalesTable";
pub const PIPELINE_NAME: &str = "RawDataLoadPipeline";
pub const COPY_ACTIVITY: &str = "CopyToRawTable";

/// Source CSV header name to raw table column, in sink column order.
pub const COLUMN_MAPPINGS: &[(&str, &str)] = &[
    ("Region", "region"),
    ("Country", "country"),
    ("Item Type", "item_type"),
    ("Sales Channel", "sales_channel"),
    ("Order Priority", "order_priority"),
    ("Order Date", "order_date"),
    ("Order ID", "order_id"),
    ("Ship Date", "ship_date"),
    ("Units Sold", "units_sold"),
    ("Unit Price", "unit_price"),
    ("Unit Cost", "unit_cost"),
];

/// Handle for a triggered run. The deployer captures the id and stops there;
/// polling for completion belongs to external monitoring.
#[derive(Clone, Debug)]
pub struct PipelineRun {
    pub run_id: String,
    pub pipeline_name: String,
}

fn blob_linked_service(storage_account: &str, storage_key: &str) -> Value {
    json!({
        "properties": {
            "type": "AzureBlobStorage",
            "typeProperties": {
                "connectionString": format!(
                    "DefaultEndpointsProtocol=https;AccountName={storage_account};AccountKey={storage_key};EndpointSuffix=core.windows.net"
                ),
            },
        }
    })
}

fn warehouse_linked_service(config: &WarehouseConfig) -> Value {
    json!({
        "properties": {
            "type": "Snowflake",
            "typeProperties": {
                "connectionString": format!(
                    "jdbc:snowflake://{}.snowflakecomputing.com/?user={}&warehouse={}&db={}&schema={RAW_SCHEMA}",
                    config.account, config.user, config.warehouse, config.database
                ),
                "password": {
                    "type": "SecureString",
                    "value": config.password,
                },
            },
        }
    })
}

fn source_dataset(container: &str, blob_name: &str) -> Value {
    json!({
        "properties": {
            "type": "DelimitedText",
            "linkedServiceName": {
                "referenceName": BLOB_LINKED_SERVICE,
                "type": "LinkedServiceReference",
            },
            "typeProperties": {
                "location": {
                    "type": "AzureBlobStorageLocation",
                    "container": container,
                    "fileName": blob_name,
                },
                "columnDelimiter": ",",
                "rowDelimiter": "\n",
                "firstRowAsHeader": true,
            },
        }
    })
}

fn sink_dataset() -> Value {
    json!({
        "properties": {
            "type": "SnowflakeTable",
            "linkedServiceName": {
                "referenceName": WAREHOUSE_LINKED_SERVICE,
                "type": "LinkedServiceReference",
            },
            "typeProperties": {
                "schema": RAW_SCHEMA,
                "table": RAW_TABLE,
            },
        }
    })
}

fn copy_pipeline() -> Value {
    let mappings: Vec<Value> = COLUMN_MAPPINGS
        .iter()
        .map(|(source, sink)| {
            json!({
                "source": { "name": source },
                "sink": { "name": sink },
            })
        })
        .collect();

    json!({
        "properties": {
            "activities": [{
                "name": COPY_ACTIVITY,
                "type": "Copy",
                "inputs": [{
                    "referenceName": SOURCE_DATASET,
                    "type": "DatasetReference",
                }],
                "outputs": [{
                    "referenceName": SINK_DATASET,
                    "type": "DatasetReference",
                }],
                "typeProperties": {
                    "source": {
                        "type": "DelimitedTextSource",
                        "storeSettings": {
                            "type": "AzureBlobStorageReadSettings",
                            "recursive": false,
                            "enablePartitionDiscovery": false,
                        },
                        "formatSettings": {
                            "type": "DelimitedTextReadSettings",
                            "skipLineCount": 0,
                        },
                    },
                    "sink": {
                        "type": "SnowflakeSink",
                        "writeBehavior": "Insert",
                        "importSettings": {
                            "type": "SnowflakeImportCopyCommand",
                        },
                    },
                    "translator": {
                        "type": "TabularTranslator",
                        "mappings": mappings,
                    },
                    "enableStaging": false,
                    // row-level errors fail the copy instead of being skipped
                    "enableSkipIncompatibleRow": false,
                },
            }],
        }
    })
}

/// Registers the pipeline graph against a provisioned factory and triggers
/// one run.
pub struct Deployer<'a> {
    factories: &'a dyn FactoryApi,
    resource_group: &'a str,
    factory_name: &'a str,
}

impl<'a> Deployer<'a> {
    pub fn new(factories: &'a dyn FactoryApi, resource_group: &'a str, factory_name: &'a str) -> Self {
        Self {
            factories,
            resource_group,
            factory_name,
        }
    }

    /// Register both linked services. Always an upsert; independent of each
    /// other but each one fatal on failure.
    pub fn deploy_linked_services(
        &self,
        azure: &AzureConfig,
        storage_key: &str,
        warehouse: &WarehouseConfig,
    ) -> Result<()> {
        tracing::info!("registering linked services");
        self.factories
            .put_linked_service(
                self.resource_group,
                self.factory_name,
                BLOB_LINKED_SERVICE,
                &blob_linked_service(&azure.storage_account, storage_key),
            )
            .context("register blob linked service")?;
        self.factories
            .put_linked_service(
                self.resource_group,
                self.factory_name,
                WAREHOUSE_LINKED_SERVICE,
                &warehouse_linked_service(warehouse),
            )
            .context("register warehouse linked service")?;
        Ok(())
    }

    pub fn deploy_datasets(&self, azure: &AzureConfig) -> Result<()> {
        tracing::info!("registering datasets");
        self.factories
            .put_dataset(
                self.resource_group,
                self.factory_name,
                SOURCE_DATASET,
                &source_dataset(&azure.container_name, &azure.blob_name),
            )
            .context("register source dataset")?;
        self.factories
            .put_dataset(
                self.resource_group,
                self.factory_name,
                SINK_DATASET,
                &sink_dataset(),
            )
            .context("register sink dataset")?;
        Ok(())
    }

    /// Register the pipeline under its fixed name, overwriting any previous
    /// definition.
    pub fn deploy_pipeline(&self) -> Result<()> {
        tracing::info!("registering pipeline {PIPELINE_NAME}");
        self.factories
            .put_pipeline(
                self.resource_group,
                self.factory_name,
                PIPELINE_NAME,
                &copy_pipeline(),
            )
            .context("register pipeline")?;
        Ok(())
    }

    /// Trigger one run and hand back its id. No polling, no retry.
    pub fn trigger(&self) -> Result<PipelineRun> {
        let run_id = self
            .factories
            .create_run(self.resource_group, self.factory_name, PIPELINE_NAME)
            .context("trigger pipeline run")?;
        tracing::info!("pipeline {PIPELINE_NAME} run started: {run_id}");
        Ok(PipelineRun {
            run_id,
            pipeline_name: PIPELINE_NAME.to_string(),
        })
    }

    /// Full deployment: linked services, datasets, pipeline, then one run.
    pub fn deploy_and_run(
        &self,
        azure: &AzureConfig,
        storage_key: &str,
        warehouse: &WarehouseConfig,
    ) -> Result<PipelineRun> {
        self.deploy_linked_services(azure, storage_key, warehouse)?;
        self.deploy_datasets(azure)?;
        self.deploy_pipeline()?;
        self.trigger()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_activity_maps_every_source_column() {
        let pipeline = copy_pipeline();
        let mappings = pipeline["properties"]["activities"][0]["typeProperties"]["translator"]
            ["mappings"]
            .as_array()
            .expect("translator has mappings");
        assert_eq!(mappings.len(), COLUMN_MAPPINGS.len());
        assert_eq!(mappings[0]["source"]["name"], "Region");
        assert_eq!(mappings[0]["sink"]["name"], "region");
        assert_eq!(mappings[10]["sink"]["name"], "unit_cost");
    }

    #[test]
    fn copy_activity_wires_source_to_sink() {
        let pipeline = copy_pipeline();
        let activity = &pipeline["properties"]["activities"][0];
        assert_eq!(activity["type"], "Copy");
        assert_eq!(activity["inputs"][0]["referenceName"], SOURCE_DATASET);
        assert_eq!(activity["outputs"][0]["referenceName"], SINK_DATASET);
        assert_eq!(
            activity["typeProperties"]["sink"]["type"],
            "SnowflakeSink"
        );
        assert_eq!(
            activity["typeProperties"]["sink"]["writeBehavior"],
            "Insert"
        );
        assert_eq!(
            activity["typeProperties"]["enableSkipIncompatibleRow"],
            false
        );
    }

    #[test]
    fn datasets_reference_their_linked_services() {
        let source = source_dataset("sales-container", "10000 Sales Records.csv");
        assert_eq!(
            source["properties"]["linkedServiceName"]["referenceName"],
            BLOB_LINKED_SERVICE
        );
        assert_eq!(
            source["properties"]["typeProperties"]["location"]["fileName"],
            "10000 Sales Records.csv"
        );
        assert_eq!(
            source["properties"]["typeProperties"]["firstRowAsHeader"],
            true
        );

        let sink = sink_dataset();
        assert_eq!(
            sink["properties"]["linkedServiceName"]["referenceName"],
            WAREHOUSE_LINKED_SERVICE
        );
        assert_eq!(sink["properties"]["typeProperties"]["table"], RAW_TABLE);
        assert_eq!(sink["properties"]["typeProperties"]["schema"], RAW_SCHEMA);
    }

    #[test]
    fn warehouse_linked_service_targets_the_raw_schema() {
        let warehouse = WarehouseConfig {
            account: "acct".into(),
            user: "alice".into(),
            password: "pw".into(),
            database: "SALES".into(),
            warehouse: "wh".into(),
            schema: "RAW".into(),
        };
        let definition = warehouse_linked_service(&warehouse);
        let connection = definition["properties"]["typeProperties"]["connectionString"]
            .as_str()
            .expect("connection string present");
        assert!(connection.contains("acct.snowflakecomputing.com"), "{connection}");
        assert!(connection.ends_with("&schema=RAW"), "{connection}");
        assert_eq!(
            definition["properties"]["typeProperties"]["password"]["type"],
            "SecureString"
        );
    }
}
