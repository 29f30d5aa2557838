//! API contract normalization of template references
//!
//! A ClusterClass may reference a template at an apiVersion that is no longer
//! the one its provider serves for the current Cluster API contract. Provider
//! CRDs advertise the versions they implement per contract in a label such
//! as `cluster.x-k8s.io/v1beta1: v1alpha4_v1beta1`; references are moved to
//! the most preferred version in that list.

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::Api;
use kube::core::Version;
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use lattice_common::crd::ObjectReference;
use lattice_common::kube_utils::{crd_name, discover_api_resource, is_not_found};
use lattice_common::Error;

use crate::constants::CONTRACT_LABEL_PREFIX;

/// Rewrites references to the apiVersion matching the current contract
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContractNormalizer: Send + Sync {
    /// Update `reference.api_version` in place; other fields are left alone
    async fn normalize(&self, reference: &mut ObjectReference) -> Result<(), Error>;
}

/// Normalizer reading the contract label of the referenced kind's CRD
pub struct CrdContractNormalizer {
    client: Client,
    contract: String,
}

impl CrdContractNormalizer {
    /// Create a normalizer for the given contract version (e.g. "v1beta1")
    pub fn new(client: Client, contract: impl Into<String>) -> Self {
        Self {
            client,
            contract: contract.into(),
        }
    }

    fn contract_label(&self) -> String {
        format!("{}/{}", CONTRACT_LABEL_PREFIX, self.contract)
    }
}

#[async_trait]
impl ContractNormalizer for CrdContractNormalizer {
    async fn normalize(&self, reference: &mut ObjectReference) -> Result<(), Error> {
        let resource =
            discover_api_resource(&self.client, &reference.api_version, &reference.kind).await?;
        let group = &resource.group;
        let name = crd_name(&resource);

        let crds: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let crd = crds.get(&name).await.map_err(|e| {
            if is_not_found(&e) {
                Error::validation_for_field(
                    &name,
                    "kind",
                    format!("no CRD is installed for {}", reference.kind),
                )
            } else {
                Error::from(e)
            }
        })?;

        let label = self.contract_label();
        let versions = crd.labels().get(&label).ok_or_else(|| {
            Error::validation_for_field(
                &name,
                format!("metadata.labels[{}]", label),
                "CRD does not declare versions for the contract",
            )
        })?;
        let version = preferred_version(versions).ok_or_else(|| {
            Error::validation_for_field(
                &name,
                format!("metadata.labels[{}]", label),
                "contract label lists no versions",
            )
        })?;

        let api_version = format!("{}/{}", group, version);
        if api_version != reference.api_version {
            debug!(
                kind = %reference.kind,
                name = %reference.name,
                from = %reference.api_version,
                to = %api_version,
                "Updating reference to the current contract"
            );
            reference.api_version = api_version;
        }
        Ok(())
    }
}

/// Most preferred version in an underscore-separated contract label value
///
/// Versions are ranked the way Kubernetes ranks them (stable over beta over
/// alpha, newer over older).
pub fn preferred_version(versions: &str) -> Option<&str> {
    versions
        .split('_')
        .filter(|v| !v.is_empty())
        .max_by_key(|v| Version::parse(v).priority())
}
