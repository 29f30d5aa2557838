//! Read/write access to ClusterClasses and provider objects
//!
//! Provides a trait-based abstraction so the class loader and current-state
//! fetch can be tested with mocks while production code talks to the API
//! server through kube-rs.

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use lattice_common::crd::{ClusterClass, ObjectReference};
use lattice_common::kube_utils::discover_api_resource;
use lattice_common::{Error, LATTICE_FIELD_MANAGER};

/// Trait abstracting the objects a topology computation reads and writes
///
/// A missing object is `Ok(None)`, never an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get a ClusterClass by namespace and name
    async fn get_cluster_class(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ClusterClass>, Error>;

    /// Persist the spec of a ClusterClass
    async fn patch_cluster_class(&self, class: &ClusterClass) -> Result<(), Error>;

    /// Get an arbitrary object by reference
    ///
    /// The reference must carry a namespace.
    async fn get_object(&self, reference: &ObjectReference)
        -> Result<Option<DynamicObject>, Error>;
}

/// Merge patch body persisting the spec of a corrected ClusterClass
///
/// The whole spec is sent, unmodeled fields included, since a merge patch
/// replaces arrays such as `workers.machineDeployments` wholesale. The
/// resourceVersion the class was read at is carried along so the write fails
/// with a conflict if the class changed in the meantime.
pub fn cluster_class_patch(class: &ClusterClass) -> serde_json::Value {
    let mut patch = serde_json::json!({ "spec": class.spec });
    if let Some(version) = class.resource_version() {
        patch["metadata"] = serde_json::json!({ "resourceVersion": version });
    }
    patch
}

/// Object store backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    /// Create a new KubeObjectStore
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get_cluster_class(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ClusterClass>, Error> {
        let api: Api<ClusterClass> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_cluster_class(&self, class: &ClusterClass) -> Result<(), Error> {
        let namespace = class.namespace().ok_or_else(|| {
            Error::validation_for_field(class.name_any(), "metadata.namespace", "missing namespace")
        })?;
        let api: Api<ClusterClass> = Api::namespaced(self.client.clone(), &namespace);

        let patch = cluster_class_patch(class);
        let params = PatchParams {
            field_manager: Some(LATTICE_FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        api.patch(&class.name_any(), &params, &Patch::Merge(&patch))
            .await?;

        debug!(
            name = %class.name_any(),
            namespace = %namespace,
            "Patched ClusterClass"
        );
        Ok(())
    }

    async fn get_object(
        &self,
        reference: &ObjectReference,
    ) -> Result<Option<DynamicObject>, Error> {
        let ar =
            discover_api_resource(&self.client, &reference.api_version, &reference.kind).await?;
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &reference.namespace, &ar);
        Ok(api.get_opt(&reference.name).await?)
    }
}
