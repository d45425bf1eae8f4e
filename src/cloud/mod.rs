//! Collaborator seams for the cloud control plane.
//!
//! Provisioning and deployment talk to these traits, never to a concrete
//! client, so every step can be exercised against in-memory fakes. The
//! production implementation is [`arm::ArmClient`].
use anyhow::Result;
use serde_json::Value;
use std::fmt;

pub mod arm;
pub mod sas;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ResourceKind {
    ResourceGroup,
    StorageAccount,
    Container,
    Factory,
    LinkedService,
    Dataset,
    Pipeline,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::ResourceGroup => "resource-group",
            ResourceKind::StorageAccount => "storage-account",
            ResourceKind::Container => "container",
            ResourceKind::Factory => "factory",
            ResourceKind::LinkedService => "linked-service",
            ResourceKind::Dataset => "dataset",
            ResourceKind::Pipeline => "pipeline",
        };
        f.write_str(label)
    }
}

/// Identity plus desired configuration for one managed resource.
///
/// Identity is `(kind, name, scope)`; names come from configuration and must
/// stay stable across runs for the create-if-absent policy to converge.
#[derive(Clone, Debug)]
pub struct ResourceDescriptor {
    pub kind: ResourceKind,
    pub name: String,
    pub scope: String,
    pub properties: Value,
}

impl ResourceDescriptor {
    pub fn new(kind: ResourceKind, name: &str, scope: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            scope: scope.to_string(),
            properties: Value::Null,
        }
    }
}

/// Direct-lookup probe result. Absence is a value here, never an error:
/// transport and auth failures stay on the `Err` path so callers cannot
/// accidentally swallow them.
#[derive(Debug)]
pub enum Probe {
    Found(ResourceDescriptor),
    NotFound,
}

/// Outcome of one create-if-absent step, kept for logging and reporting.
#[derive(Clone, Debug)]
pub struct ProvisioningResult {
    pub descriptor: ResourceDescriptor,
    pub existed_before: bool,
}

pub trait ResourceGroupApi {
    fn list(&self) -> Result<Vec<String>>;
    fn create(&self, name: &str, region: &str) -> Result<()>;
}

pub trait StorageAccountApi {
    /// Account names under the resource group; an absent group reads as empty.
    fn list(&self, resource_group: &str) -> Result<Vec<String>>;
    /// Create the account and block until it is fully provisioned, not merely
    /// accepted. Downstream key retrieval depends on a usable account.
    fn create_blocking(&self, resource_group: &str, name: &str, region: &str) -> Result<()>;
    fn list_keys(&self, resource_group: &str, name: &str) -> Result<Vec<String>>;
}

pub trait BlobApi {
    /// Container names under the account; an absent account reads as empty.
    fn list_containers(&self, resource_group: &str, account: &str) -> Result<Vec<String>>;
    fn create_container(&self, resource_group: &str, account: &str, name: &str) -> Result<()>;
    fn upload(
        &self,
        account: &str,
        sas_token: &str,
        container: &str,
        blob: &str,
        body: &[u8],
        overwrite: bool,
    ) -> Result<()>;
}

pub trait FactoryApi {
    fn get(&self, resource_group: &str, name: &str) -> Result<Probe>;
    fn create(&self, resource_group: &str, name: &str, region: &str) -> Result<()>;
    fn put_linked_service(
        &self,
        resource_group: &str,
        factory: &str,
        name: &str,
        definition: &Value,
    ) -> Result<()>;
    fn put_dataset(
        &self,
        resource_group: &str,
        factory: &str,
        name: &str,
        definition: &Value,
    ) -> Result<()>;
    fn put_pipeline(
        &self,
        resource_group: &str,
        factory: &str,
        name: &str,
        definition: &Value,
    ) -> Result<()>;
    fn create_run(&self, resource_group: &str, factory: &str, pipeline: &str) -> Result<String>;
}

/// Per-run collaborator context passed explicitly to each step.
pub struct CloudServices<'a> {
    pub resource_groups: &'a dyn ResourceGroupApi,
    pub storage: &'a dyn StorageAccountApi,
    pub blobs: &'a dyn BlobApi,
    pub factories: &'a dyn FactoryApi,
}

/// RFC 3986 unreserved-set percent encoding for path segments and query
/// values (blob names carry spaces; SAS signatures carry `+` and `/`).
pub(crate) fn percent_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_encode_keeps_unreserved_bytes() {
        assert_eq!(percent_encode("abc-123_.~"), "abc-123_.~");
    }

    #[test]
    fn percent_encode_escapes_separators() {
        assert_eq!(
            percent_encode("10000 Sales Records.csv"),
            "10000%20Sales%20Records.csv"
        );
        assert_eq!(percent_encode("a+b/c="), "a%2Bb%2Fc%3D");
    }
}
