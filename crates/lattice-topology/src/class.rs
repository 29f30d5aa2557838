//! Loading a ClusterClass and the templates it references
//!
//! References in a ClusterClass are normalized to the current API contract
//! while their templates are loaded. Corrected references are written back
//! to the ClusterClass after loading finishes, whether or not loading
//! succeeded, so a half-migrated class still makes progress.

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, info, instrument};

use lattice_common::crd::{Cluster, ClusterClass, ObjectReference};

use crate::contract::ContractNormalizer;
use crate::error::TopologyError;
use crate::state::{
    ClassTemplate, ControlPlaneTopologyClass, MachineDeploymentTopologyClass, TopologyClass,
};
use crate::store::ObjectStore;

/// Templates loaded for a ClusterClass, before being paired with the class
struct LoadedTemplates {
    infrastructure_cluster_template: ClassTemplate,
    control_plane: ControlPlaneTopologyClass,
    machine_deployments: BTreeMap<String, MachineDeploymentTopologyClass>,
}

/// Loads ClusterClasses and their templates
#[derive(Clone)]
pub struct ClassLoader {
    store: Arc<dyn ObjectStore>,
    normalizer: Arc<dyn ContractNormalizer>,
}

impl ClassLoader {
    /// Create a loader reading through `store` and normalizing with `normalizer`
    pub fn new(store: Arc<dyn ObjectStore>, normalizer: Arc<dyn ContractNormalizer>) -> Self {
        Self { store, normalizer }
    }

    /// Load the ClusterClass of a managed Cluster and every template it references
    ///
    /// If normalization changed any reference, the ClusterClass is patched
    /// even when a later template failed to load; both failures are then
    /// reported together.
    #[instrument(skip_all, fields(cluster = %cluster.name_any()))]
    pub async fn get_class(&self, cluster: &Cluster) -> Result<TopologyClass, TopologyError> {
        let topology = cluster
            .topology()
            .ok_or_else(|| TopologyError::TopologyNotDefined {
                cluster: cluster.name_any(),
            })?;
        let namespace = cluster.namespace().unwrap_or_default();

        let original = match self
            .store
            .get_cluster_class(&namespace, &topology.class)
            .await
        {
            Ok(Some(class)) => class,
            Ok(None) => {
                return Err(TopologyError::ClassNotFound {
                    name: topology.class.clone(),
                    namespace,
                })
            }
            Err(e) => {
                return Err(TopologyError::fetch(
                    &ObjectReference {
                        api_version: String::new(),
                        kind: "ClusterClass".to_string(),
                        namespace,
                        name: topology.class.clone(),
                    },
                    e,
                ))
            }
        };

        let mut cluster_class = original.clone();
        let loaded = self.load_templates(&mut cluster_class).await;
        let persisted = self.persist_corrections(&original, &cluster_class).await;

        let templates = TopologyError::combine(loaded, persisted)?;
        debug!(class = %cluster_class.name_any(), "Loaded ClusterClass");

        Ok(TopologyClass {
            cluster_class,
            infrastructure_cluster_template: templates.infrastructure_cluster_template,
            control_plane: templates.control_plane,
            machine_deployments: templates.machine_deployments,
        })
    }

    /// Load a template, normalizing its reference in place first
    ///
    /// Fails before touching the API server when the reference is absent.
    /// An empty reference namespace means the ClusterClass namespace.
    pub async fn get_template(
        &self,
        field: &str,
        class_namespace: &str,
        reference: Option<&mut ObjectReference>,
    ) -> Result<ClassTemplate, TopologyError> {
        let reference = reference.ok_or_else(|| TopologyError::ReferenceNotSet {
            field: field.to_string(),
        })?;

        let mut normalized = reference.clone();
        self.normalizer
            .normalize(&mut normalized)
            .await
            .map_err(|source| TopologyError::ContractNormalization {
                kind: reference.kind.clone(),
                name: reference.name.clone(),
                source,
            })?;
        reference.api_version = normalized.api_version;

        let mut lookup = reference.clone();
        if lookup.namespace.is_empty() {
            lookup.namespace = class_namespace.to_string();
        }

        let object = self
            .store
            .get_object(&lookup)
            .await
            .map_err(|e| TopologyError::fetch(&lookup, e))?
            .ok_or_else(|| TopologyError::not_found(&lookup))?;

        debug!(
            field = %field,
            kind = %lookup.kind,
            name = %lookup.name,
            namespace = %lookup.namespace,
            "Loaded template"
        );

        Ok(ClassTemplate {
            reference: lookup,
            object,
        })
    }

    async fn load_templates(
        &self,
        class: &mut ClusterClass,
    ) -> Result<LoadedTemplates, TopologyError> {
        let namespace = class.namespace().unwrap_or_default();
        let spec = &mut class.spec;

        let infrastructure_cluster_template = self
            .get_template(
                "spec.infrastructure.ref",
                &namespace,
                spec.infrastructure.reference.as_mut(),
            )
            .await?;

        let template = self
            .get_template(
                "spec.controlPlane.ref",
                &namespace,
                spec.control_plane.reference.as_mut(),
            )
            .await?;

        let infrastructure_machine_template = match spec
            .control_plane
            .machine_infrastructure
            .as_mut()
            .and_then(|mi| mi.reference.as_mut())
        {
            Some(reference) => Some(
                self.get_template(
                    "spec.controlPlane.machineInfrastructure.ref",
                    &namespace,
                    Some(reference),
                )
                .await?,
            ),
            None => None,
        };

        let mut machine_deployments = BTreeMap::new();
        for (i, mdc) in spec.workers.machine_deployments.iter_mut().enumerate() {
            let infrastructure_machine_template = self
                .get_template(
                    &format!(
                        "spec.workers.machineDeployments[{}].template.infrastructure.ref",
                        i
                    ),
                    &namespace,
                    mdc.template.infrastructure.reference.as_mut(),
                )
                .await?;

            let bootstrap_template = self
                .get_template(
                    &format!(
                        "spec.workers.machineDeployments[{}].template.bootstrap.ref",
                        i
                    ),
                    &namespace,
                    mdc.template.bootstrap.reference.as_mut(),
                )
                .await?;

            machine_deployments.insert(
                mdc.class.clone(),
                MachineDeploymentTopologyClass {
                    bootstrap_template,
                    infrastructure_machine_template,
                },
            );
        }

        Ok(LoadedTemplates {
            infrastructure_cluster_template,
            control_plane: ControlPlaneTopologyClass {
                template,
                infrastructure_machine_template,
            },
            machine_deployments,
        })
    }

    /// Patch the ClusterClass if loading corrected any of its references
    async fn persist_corrections(
        &self,
        original: &ClusterClass,
        corrected: &ClusterClass,
    ) -> Result<(), TopologyError> {
        if original.spec == corrected.spec {
            return Ok(());
        }

        self.store
            .patch_cluster_class(corrected)
            .await
            .map_err(|source| TopologyError::ClassPatch {
                name: corrected.name_any(),
                namespace: corrected.namespace().unwrap_or_default(),
                source,
            })?;

        info!(
            class = %corrected.name_any(),
            namespace = %corrected.namespace().unwrap_or_default(),
            "Updated ClusterClass references to the current contract"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockContractNormalizer;
    use crate::store::MockObjectStore;
    use kube::api::DynamicObject;
    use lattice_common::crd::{
        ClusterClassSpec, ClusterSpec, ControlPlaneClass, LocalObjectTemplate,
        MachineDeploymentClass, MachineDeploymentClassTemplate, Topology, WorkersClass,
    };
    use serde_json::json;

    const OLD_INFRA: &str = "infrastructure.cluster.x-k8s.io/v1alpha4";
    const NEW_INFRA: &str = "infrastructure.cluster.x-k8s.io/v1beta1";

    fn reference(api_version: &str, kind: &str, name: &str) -> ObjectReference {
        ObjectReference {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: String::new(),
            name: name.to_string(),
        }
    }

    fn local(api_version: &str, kind: &str, name: &str) -> LocalObjectTemplate {
        LocalObjectTemplate {
            reference: Some(reference(api_version, kind, name)),
        }
    }

    fn cluster() -> Cluster {
        let mut cluster = Cluster::new(
            "c1",
            ClusterSpec {
                topology: Some(Topology {
                    class: "quick-start".to_string(),
                    version: "v1.31.0".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        cluster.metadata.namespace = Some("ns".to_string());
        cluster
    }

    fn cluster_class(spec: ClusterClassSpec) -> ClusterClass {
        let mut class = ClusterClass::new("quick-start", spec);
        class.metadata.namespace = Some("ns".to_string());
        class
    }

    fn full_spec() -> ClusterClassSpec {
        ClusterClassSpec {
            infrastructure: local(NEW_INFRA, "DockerClusterTemplate", "infra"),
            control_plane: ControlPlaneClass {
                reference: Some(reference(
                    "controlplane.cluster.x-k8s.io/v1beta1",
                    "KubeadmControlPlaneTemplate",
                    "cp",
                )),
                machine_infrastructure: Some(local(
                    NEW_INFRA,
                    "DockerMachineTemplate",
                    "cp-machines",
                )),
                ..Default::default()
            },
            workers: WorkersClass {
                machine_deployments: vec![MachineDeploymentClass {
                    class: "default-worker".to_string(),
                    template: MachineDeploymentClassTemplate {
                        bootstrap: local(
                            "bootstrap.cluster.x-k8s.io/v1beta1",
                            "KubeadmConfigTemplate",
                            "workers",
                        ),
                        infrastructure: local(NEW_INFRA, "DockerMachineTemplate", "workers"),
                        ..Default::default()
                    },
                    ..Default::default()
                }],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn object_for(reference: &ObjectReference) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": reference.api_version,
            "kind": reference.kind,
            "metadata": { "name": reference.name, "namespace": reference.namespace },
            "spec": { "template": { "spec": {} } }
        }))
        .expect("object should deserialize")
    }

    fn identity_normalizer() -> MockContractNormalizer {
        let mut normalizer = MockContractNormalizer::new();
        normalizer.expect_normalize().returning(|_| Ok(()));
        normalizer
    }

    fn upgrading_normalizer() -> MockContractNormalizer {
        let mut normalizer = MockContractNormalizer::new();
        normalizer.expect_normalize().returning(|reference| {
            if reference.api_version == OLD_INFRA {
                reference.api_version = NEW_INFRA.to_string();
            }
            Ok(())
        });
        normalizer
    }

    fn loader(store: MockObjectStore, normalizer: MockContractNormalizer) -> ClassLoader {
        ClassLoader::new(Arc::new(store), Arc::new(normalizer))
    }

    #[tokio::test]
    async fn test_get_class_loads_every_template() {
        let mut store = MockObjectStore::new();
        store
            .expect_get_cluster_class()
            .withf(|ns, name| ns == "ns" && name == "quick-start")
            .returning(|_, _| Ok(Some(cluster_class(full_spec()))));
        store
            .expect_get_object()
            .times(5)
            .returning(|reference| Ok(Some(object_for(reference))));
        store.expect_patch_cluster_class().never();

        let class = loader(store, identity_normalizer())
            .get_class(&cluster())
            .await
            .expect("get_class should succeed");

        assert_eq!(class.infrastructure_cluster_template.kind(), "DockerClusterTemplate");
        assert_eq!(class.control_plane.template.kind(), "KubeadmControlPlaneTemplate");
        assert!(class.control_plane.infrastructure_machine_template.is_some());
        let worker = class
            .machine_deployments
            .get("default-worker")
            .expect("worker class should be loaded");
        assert_eq!(worker.bootstrap_template.kind(), "KubeadmConfigTemplate");
        assert_eq!(worker.infrastructure_machine_template.kind(), "DockerMachineTemplate");
    }

    #[tokio::test]
    async fn test_empty_reference_namespace_uses_class_namespace() {
        let mut store = MockObjectStore::new();
        store
            .expect_get_cluster_class()
            .returning(|_, _| Ok(Some(cluster_class(full_spec()))));
        store
            .expect_get_object()
            .withf(|reference| reference.namespace == "ns")
            .returning(|reference| Ok(Some(object_for(reference))));

        let class = loader(store, identity_normalizer())
            .get_class(&cluster())
            .await
            .expect("get_class should succeed");

        assert_eq!(class.infrastructure_cluster_template.reference.namespace, "ns");
        // the stored ClusterClass is not rewritten with the defaulted namespace
        let stored = class
            .cluster_class
            .spec
            .infrastructure
            .reference
            .expect("reference should be set");
        assert!(stored.namespace.is_empty());
    }

    #[tokio::test]
    async fn test_missing_class_is_class_not_found() {
        let mut store = MockObjectStore::new();
        store.expect_get_cluster_class().returning(|_, _| Ok(None));

        let err = loader(store, MockContractNormalizer::new())
            .get_class(&cluster())
            .await
            .unwrap_err();

        match err {
            TopologyError::ClassNotFound { name, namespace } => {
                assert_eq!(name, "quick-start");
                assert_eq!(namespace, "ns");
            }
            other => panic!("Expected ClassNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cluster_without_topology() {
        let mut plain = Cluster::new("plain", ClusterSpec::default());
        plain.metadata.namespace = Some("ns".to_string());

        let err = loader(MockObjectStore::new(), MockContractNormalizer::new())
            .get_class(&plain)
            .await
            .unwrap_err();
        assert!(matches!(err, TopologyError::TopologyNotDefined { .. }));
    }

    /// Story: A ClusterClass without an infrastructure reference fails
    /// before any template is read.
    #[tokio::test]
    async fn story_reference_not_set_before_any_fetch() {
        let mut spec = full_spec();
        spec.infrastructure.reference = None;

        let mut store = MockObjectStore::new();
        store
            .expect_get_cluster_class()
            .returning(move |_, _| Ok(Some(cluster_class(spec.clone()))));
        store.expect_get_object().never();
        store.expect_patch_cluster_class().never();
        let mut normalizer = MockContractNormalizer::new();
        normalizer.expect_normalize().never();

        let err = loader(store, normalizer)
            .get_class(&cluster())
            .await
            .unwrap_err();

        match err {
            TopologyError::ReferenceNotSet { field } => {
                assert_eq!(field, "spec.infrastructure.ref")
            }
            other => panic!("Expected ReferenceNotSet, got {:?}", other),
        }
    }

    /// Story: An infrastructure reference still on an old contract version is
    /// corrected and persisted, even though the control plane template it is
    /// loaded alongside is missing. Both problems are reported.
    #[tokio::test]
    async fn story_corrections_persisted_when_later_template_missing() {
        let mut spec = full_spec();
        spec.infrastructure = local(OLD_INFRA, "DockerClusterTemplate", "infra");

        let mut store = MockObjectStore::new();
        store
            .expect_get_cluster_class()
            .returning(move |_, _| Ok(Some(cluster_class(spec.clone()))));
        store.expect_get_object().returning(|reference| {
            if reference.kind == "KubeadmControlPlaneTemplate" {
                Ok(None)
            } else {
                Ok(Some(object_for(reference)))
            }
        });
        store
            .expect_patch_cluster_class()
            .times(1)
            .withf(|class| {
                class
                    .spec
                    .infrastructure
                    .reference
                    .as_ref()
                    .is_some_and(|r| r.api_version == NEW_INFRA)
            })
            .returning(|_| Err(lattice_common::Error::internal("conflict")));

        let err = loader(store, upgrading_normalizer())
            .get_class(&cluster())
            .await
            .unwrap_err();

        let errors = err.errors();
        assert_eq!(errors.len(), 2);
        match &errors[0] {
            TopologyError::Fetch { kind, name, namespace, .. } => {
                assert_eq!(kind, "KubeadmControlPlaneTemplate");
                assert_eq!(name, "cp");
                assert_eq!(namespace, "ns");
            }
            other => panic!("Expected Fetch, got {:?}", other),
        }
        assert!(matches!(errors[1], TopologyError::ClassPatch { .. }));
    }

    #[tokio::test]
    async fn test_successful_correction_is_persisted() {
        let mut spec = full_spec();
        spec.infrastructure = local(OLD_INFRA, "DockerClusterTemplate", "infra");

        let mut store = MockObjectStore::new();
        store
            .expect_get_cluster_class()
            .returning(move |_, _| Ok(Some(cluster_class(spec.clone()))));
        store
            .expect_get_object()
            .returning(|reference| Ok(Some(object_for(reference))));
        store
            .expect_patch_cluster_class()
            .times(1)
            .returning(|_| Ok(()));

        let class = loader(store, upgrading_normalizer())
            .get_class(&cluster())
            .await
            .expect("get_class should succeed");

        assert_eq!(class.infrastructure_cluster_template.reference.api_version, NEW_INFRA);
    }

    #[tokio::test]
    async fn test_normalizer_cannot_rewrite_name() {
        let mut normalizer = MockContractNormalizer::new();
        normalizer.expect_normalize().returning(|reference| {
            reference.name = "hijacked".to_string();
            Ok(())
        });
        let mut store = MockObjectStore::new();
        store
            .expect_get_object()
            .withf(|reference| reference.name == "infra")
            .returning(|reference| Ok(Some(object_for(reference))));

        let mut reference = reference(NEW_INFRA, "DockerClusterTemplate", "infra");
        let template = loader(store, normalizer)
            .get_template("spec.infrastructure.ref", "ns", Some(&mut reference))
            .await
            .expect("get_template should succeed");

        assert_eq!(template.reference.name, "infra");
        assert_eq!(reference.name, "infra");
    }

    #[tokio::test]
    async fn test_normalization_failure_names_the_reference() {
        let mut normalizer = MockContractNormalizer::new();
        normalizer
            .expect_normalize()
            .returning(|_| Err(lattice_common::Error::validation("missing contract label")));

        let mut reference = reference(NEW_INFRA, "DockerClusterTemplate", "infra");
        let err = loader(MockObjectStore::new(), normalizer)
            .get_template("spec.infrastructure.ref", "ns", Some(&mut reference))
            .await
            .unwrap_err();

        match err {
            TopologyError::ContractNormalization { kind, name, .. } => {
                assert_eq!(kind, "DockerClusterTemplate");
                assert_eq!(name, "infra");
            }
            other => panic!("Expected ContractNormalization, got {:?}", other),
        }
    }
}
