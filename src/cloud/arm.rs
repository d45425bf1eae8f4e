//! Management-plane client over plain HTTPS.
//!
//! One narrow module owns every wire detail: token acquisition, resource
//! CRUD, the storage provisioning wait, and the SAS-authenticated blob
//! upload. Everything above this file sees only the `cloud` traits.
use crate::cloud::{
    percent_encode, BlobApi, FactoryApi, Probe, ResourceDescriptor, ResourceGroupApi,
    ResourceKind, StorageAccountApi,
};
use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::thread;
use std::time::Duration;

const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
const LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";
const RESOURCES_API: &str = "2021-04-01";
const STORAGE_API: &str = "2023-01-01";
const DATAFACTORY_API: &str = "2018-06-01";
const BLOB_SERVICE_VERSION: &str = "2021-08-06";

const PROVISION_POLL_INTERVAL: Duration = Duration::from_secs(5);
const PROVISION_POLL_ATTEMPTS: u32 = 60;

/// Service-principal-authenticated client for one subscription.
pub struct ArmClient {
    subscription_id: String,
    token: String,
}

impl ArmClient {
    /// Exchange service-principal credentials for a management-plane token.
    pub fn connect(
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        subscription_id: &str,
    ) -> Result<Self> {
        tracing::info!("authenticating with the management plane");
        let url = format!("{LOGIN_ENDPOINT}/{tenant_id}/oauth2/v2.0/token");
        let mut response = ureq::post(&url)
            .send_form([
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("scope", "https://management.azure.com/.default"),
            ])
            .context("request management-plane token")?;
        let body: Value = response
            .body_mut()
            .read_json()
            .context("parse token response")?;
        let token = body["access_token"]
            .as_str()
            .ok_or_else(|| anyhow!("token response missing access_token"))?
            .to_string();
        Ok(Self {
            subscription_id: subscription_id.to_string(),
            token,
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn subscription_url(&self, suffix: &str, api_version: &str) -> String {
        format!(
            "{MANAGEMENT_ENDPOINT}/subscriptions/{}{suffix}?api-version={api_version}",
            self.subscription_id
        )
    }

    fn get_json(&self, url: &str) -> Result<Value, ureq::Error> {
        let mut response = ureq::get(url).header("Authorization", self.bearer()).call()?;
        response.body_mut().read_json()
    }

    fn put_json(&self, url: &str, body: &Value) -> Result<Value, ureq::Error> {
        let mut response = ureq::put(url)
            .header("Authorization", self.bearer())
            .send_json(body)?;
        response.body_mut().read_json()
    }

    /// Resource names from a collection response, reading a 404 on the
    /// enclosing scope as an empty listing (first-run case).
    fn list_names(&self, url: &str) -> Result<Vec<String>> {
        let body = match self.get_json(url) {
            Ok(body) => body,
            Err(err) if is_not_found(&err) => return Ok(Vec::new()),
            Err(err) => return Err(err).with_context(|| format!("list resources at {url}")),
        };
        let names = body["value"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }
}

fn is_not_found(err: &ureq::Error) -> bool {
    matches!(err, ureq::Error::StatusCode(404))
}

impl ResourceGroupApi for ArmClient {
    fn list(&self) -> Result<Vec<String>> {
        let url = self.subscription_url("/resourcegroups", RESOURCES_API);
        self.list_names(&url)
    }

    fn create(&self, name: &str, region: &str) -> Result<()> {
        let url = self.subscription_url(&format!("/resourcegroups/{name}"), RESOURCES_API);
        self.put_json(&url, &json!({ "location": region }))
            .with_context(|| format!("create resource group {name}"))?;
        Ok(())
    }
}

impl StorageAccountApi for ArmClient {
    fn list(&self, resource_group: &str) -> Result<Vec<String>> {
        let url = self.subscription_url(
            &format!("/resourceGroups/{resource_group}/providers/Microsoft.Storage/storageAccounts"),
            STORAGE_API,
        );
        self.list_names(&url)
    }

    fn create_blocking(&self, resource_group: &str, name: &str, region: &str) -> Result<()> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{resource_group}/providers/Microsoft.Storage/storageAccounts/{name}"
            ),
            STORAGE_API,
        );
        let definition = json!({
            "location": region,
            "kind": "StorageV2",
            "sku": { "name": "Standard_LRS" },
        });
        self.put_json(&url, &definition)
            .with_context(|| format!("create storage account {name}"))?;

        // The PUT returns once the request is accepted; keys are only usable
        // after provisioning reaches Succeeded, so wait for that here.
        for _ in 0..PROVISION_POLL_ATTEMPTS {
            let body = self
                .get_json(&url)
                .with_context(|| format!("poll storage account {name}"))?;
            match body["properties"]["provisioningState"].as_str() {
                Some("Succeeded") => return Ok(()),
                Some("Failed") => {
                    return Err(anyhow!("storage account {name} provisioning failed"))
                }
                _ => thread::sleep(PROVISION_POLL_INTERVAL),
            }
        }
        Err(anyhow!(
            "storage account {name} did not finish provisioning in time"
        ))
    }

    fn list_keys(&self, resource_group: &str, name: &str) -> Result<Vec<String>> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{resource_group}/providers/Microsoft.Storage/storageAccounts/{name}/listKeys"
            ),
            STORAGE_API,
        );
        let mut response = ureq::post(&url)
            .header("Authorization", self.bearer())
            .send_empty()
            .with_context(|| format!("list keys for storage account {name}"))?;
        let body: Value = response
            .body_mut()
            .read_json()
            .context("parse listKeys response")?;
        let keys = body["keys"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item["value"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(keys)
    }
}

impl BlobApi for ArmClient {
    fn list_containers(&self, resource_group: &str, account: &str) -> Result<Vec<String>> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{resource_group}/providers/Microsoft.Storage/storageAccounts/{account}/blobServices/default/containers"
            ),
            STORAGE_API,
        );
        self.list_names(&url)
    }

    fn create_container(&self, resource_group: &str, account: &str, name: &str) -> Result<()> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{resource_group}/providers/Microsoft.Storage/storageAccounts/{account}/blobServices/default/containers/{name}"
            ),
            STORAGE_API,
        );
        self.put_json(&url, &json!({ "properties": {} }))
            .with_context(|| format!("create container {name}"))?;
        Ok(())
    }

    fn upload(
        &self,
        account: &str,
        sas_token: &str,
        container: &str,
        blob: &str,
        body: &[u8],
        overwrite: bool,
    ) -> Result<()> {
        let url = format!(
            "https://{account}.blob.core.windows.net/{container}/{}?{sas_token}",
            percent_encode(blob)
        );
        let mut request = ureq::put(&url)
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-version", BLOB_SERVICE_VERSION);
        if !overwrite {
            request = request.header("If-None-Match", "*");
        }
        request
            .send(body)
            .with_context(|| format!("upload blob {blob} to container {container}"))?;
        Ok(())
    }
}

impl FactoryApi for ArmClient {
    fn get(&self, resource_group: &str, name: &str) -> Result<Probe> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{resource_group}/providers/Microsoft.DataFactory/factories/{name}"
            ),
            DATAFACTORY_API,
        );
        match self.get_json(&url) {
            Ok(body) => {
                let mut descriptor =
                    ResourceDescriptor::new(ResourceKind::Factory, name, resource_group);
                descriptor.properties = body;
                Ok(Probe::Found(descriptor))
            }
            Err(err) if is_not_found(&err) => Ok(Probe::NotFound),
            Err(err) => Err(err).with_context(|| format!("look up data factory {name}")),
        }
    }

    fn create(&self, resource_group: &str, name: &str, region: &str) -> Result<()> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{resource_group}/providers/Microsoft.DataFactory/factories/{name}"
            ),
            DATAFACTORY_API,
        );
        self.put_json(&url, &json!({ "location": region }))
            .with_context(|| format!("create data factory {name}"))?;
        Ok(())
    }

    fn put_linked_service(
        &self,
        resource_group: &str,
        factory: &str,
        name: &str,
        definition: &Value,
    ) -> Result<()> {
        self.put_factory_resource(resource_group, factory, "linkedservices", name, definition)
    }

    fn put_dataset(
        &self,
        resource_group: &str,
        factory: &str,
        name: &str,
        definition: &Value,
    ) -> Result<()> {
        self.put_factory_resource(resource_group, factory, "datasets", name, definition)
    }

    fn put_pipeline(
        &self,
        resource_group: &str,
        factory: &str,
        name: &str,
        definition: &Value,
    ) -> Result<()> {
        self.put_factory_resource(resource_group, factory, "pipelines", name, definition)
    }

    fn create_run(&self, resource_group: &str, factory: &str, pipeline: &str) -> Result<String> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{resource_group}/providers/Microsoft.DataFactory/factories/{factory}/pipelines/{pipeline}/createRun"
            ),
            DATAFACTORY_API,
        );
        let mut response = ureq::post(&url)
            .header("Authorization", self.bearer())
            .send_empty()
            .with_context(|| format!("trigger pipeline {pipeline}"))?;
        let body: Value = response
            .body_mut()
            .read_json()
            .context("parse createRun response")?;
        let run_id = body["runId"]
            .as_str()
            .ok_or_else(|| anyhow!("createRun response missing runId"))?
            .to_string();
        Ok(run_id)
    }
}

impl ArmClient {
    fn put_factory_resource(
        &self,
        resource_group: &str,
        factory: &str,
        collection: &str,
        name: &str,
        definition: &Value,
    ) -> Result<()> {
        let url = self.subscription_url(
            &format!(
                "/resourceGroups/{resource_group}/providers/Microsoft.DataFactory/factories/{factory}/{collection}/{name}"
            ),
            DATAFACTORY_API,
        );
        self.put_json(&url, definition)
            .with_context(|| format!("register factory {collection} entry {name}"))?;
        Ok(())
    }
}
