//! Template instantiation
//!
//! Turns ClusterClass templates into concrete objects (an infrastructure
//! cluster, a control plane) or into per-cluster copies of templates (the
//! control plane machine template). Both paths enforce the topology identity
//! labels and keep the name of an object the Cluster already references, so
//! repeated computations converge on the same identities.

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::api::DynamicObject;
use kube::ResourceExt;

use lattice_common::crd::{Cluster, ObjectReference};

use crate::constants::{
    TEMPLATE_CLONED_FROM_GROUP_KIND_ANNOTATION, TEMPLATE_CLONED_FROM_NAME_ANNOTATION,
};
use crate::error::TopologyError;
use crate::generate::{generate_template, GenerateTemplateInput};
use crate::labels::{enforce_topology_labels, merge_maps};
use crate::names::{NameGenerator, SimpleNameGenerator};

/// One instantiation request
pub struct TemplateInput<'a> {
    /// Template to instantiate
    pub template: &'a DynamicObject,
    /// Reference the template was cloned from, recorded as provenance
    pub template_ref: &'a ObjectReference,
    /// Owning Cluster
    pub cluster: &'a Cluster,
    /// Prefix for a freshly generated name
    pub name_prefix: String,
    /// Reference to the object currently in use, if any
    pub current_ref: Option<&'a ObjectReference>,
    /// Labels to apply
    pub labels: BTreeMap<String, String>,
    /// Annotations to apply
    pub annotations: BTreeMap<String, String>,
}

impl<'a> TemplateInput<'a> {
    /// Request without extra labels or annotations
    pub fn new(
        template: &'a DynamicObject,
        template_ref: &'a ObjectReference,
        cluster: &'a Cluster,
        name_prefix: impl Into<String>,
    ) -> Self {
        Self {
            template,
            template_ref,
            cluster,
            name_prefix: name_prefix.into(),
            current_ref: None,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }

    /// Reuse the name of the object `current_ref` points to, if it has one
    pub fn with_current_ref(mut self, current_ref: Option<&'a ObjectReference>) -> Self {
        self.current_ref = current_ref;
        self
    }

    /// Apply the given labels and annotations
    pub fn with_metadata(
        mut self,
        labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
    ) -> Self {
        self.labels = labels;
        self.annotations = annotations;
        self
    }
}

/// Instantiates ClusterClass templates
#[derive(Clone)]
pub struct TemplateInstantiator {
    names: Arc<dyn NameGenerator>,
}

impl Default for TemplateInstantiator {
    fn default() -> Self {
        Self::new(Arc::new(SimpleNameGenerator))
    }
}

impl TemplateInstantiator {
    /// Instantiator using the given name generator
    pub fn new(names: Arc<dyn NameGenerator>) -> Self {
        Self { names }
    }

    /// Generate a concrete object from the body of a template
    ///
    /// No owner reference is set; owners are attached when the object is
    /// actually created.
    pub fn instantiate_object(&self, input: TemplateInput<'_>) -> Result<DynamicObject, TopologyError> {
        let cluster_name = input.cluster.name_any();
        let labels = enforce_topology_labels(&input.labels, &cluster_name);

        generate_template(GenerateTemplateInput {
            template: input.template,
            template_ref: input.template_ref,
            namespace: input.cluster.namespace().as_deref().unwrap_or_default(),
            cluster_name: &cluster_name,
            labels: &labels,
            annotations: &input.annotations,
            name: self.assign_name(&input.name_prefix, input.current_ref),
        })
    }

    /// Make a per-cluster copy of a template
    ///
    /// The copy keeps the template's body and metadata; labels and
    /// annotations are layered on top of the template's own.
    pub fn instantiate_template(&self, input: TemplateInput<'_>) -> DynamicObject {
        let cluster_name = input.cluster.name_any();
        let mut template = input.template.clone();

        let existing_labels = template.metadata.labels.take().unwrap_or_default();
        let labels = merge_maps(&input.labels, &existing_labels);
        template.metadata.labels = Some(enforce_topology_labels(&labels, &cluster_name));

        let existing_annotations = template.metadata.annotations.take().unwrap_or_default();
        let mut annotations = merge_maps(&input.annotations, &existing_annotations);
        annotations.insert(
            TEMPLATE_CLONED_FROM_NAME_ANNOTATION.to_string(),
            input.template_ref.name.clone(),
        );
        annotations.insert(
            TEMPLATE_CLONED_FROM_GROUP_KIND_ANNOTATION.to_string(),
            input.template_ref.group_kind(),
        );
        template.metadata.annotations = Some(annotations);

        template.metadata.name = Some(self.assign_name(&input.name_prefix, input.current_ref));
        template
    }

    /// Reuse the current name when there is one, otherwise generate one
    fn assign_name(&self, prefix: &str, current_ref: Option<&ObjectReference>) -> String {
        match current_ref {
            Some(current) if !current.name.is_empty() => current.name.clone(),
            _ => self.names.generate(prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CLUSTER_NAME_LABEL, CLUSTER_TOPOLOGY_OWNED_LABEL};
    use crate::names::MockNameGenerator;
    use crate::reference::to_reference;
    use lattice_common::crd::ClusterSpec;
    use serde_json::json;

    fn instantiator() -> TemplateInstantiator {
        let mut names = MockNameGenerator::new();
        names
            .expect_generate()
            .returning(|prefix| format!("{}abcde", prefix));
        TemplateInstantiator::new(Arc::new(names))
    }

    fn cluster() -> Cluster {
        let mut cluster = Cluster::new("c1", ClusterSpec::default());
        cluster.metadata.namespace = Some("ns".to_string());
        cluster
    }

    fn control_plane_template() -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "controlplane.cluster.x-k8s.io/v1beta1",
            "kind": "KubeadmControlPlaneTemplate",
            "metadata": { "name": "cp-template", "namespace": "ns" },
            "spec": { "template": { "spec": { "kubeadmConfigSpec": {} } } }
        }))
        .expect("template should deserialize")
    }

    fn machine_template() -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta1",
            "kind": "DockerMachineTemplate",
            "metadata": {
                "name": "cp-machines",
                "namespace": "ns",
                "labels": { "from-template": "yes", "cluster.x-k8s.io/cluster-name": "other" },
                "annotations": { "note": "template" }
            },
            "spec": { "template": { "spec": { "extraMounts": [] } } }
        }))
        .expect("template should deserialize")
    }

    fn labels(obj: &DynamicObject) -> &BTreeMap<String, String> {
        obj.metadata.labels.as_ref().expect("labels should be set")
    }

    fn annotations(obj: &DynamicObject) -> &BTreeMap<String, String> {
        obj.metadata.annotations.as_ref().expect("annotations should be set")
    }

    /// Story: A cluster that already points at its control plane keeps
    /// pointing at the same object on every reconcile.
    #[test]
    fn story_existing_name_is_reused() {
        let template = control_plane_template();
        let template_ref = to_reference(&template);
        let cluster = cluster();
        let current = ObjectReference {
            name: "c1-abc123".to_string(),
            ..Default::default()
        };

        let obj = instantiator()
            .instantiate_object(
                TemplateInput::new(&template, &template_ref, &cluster, "c1-")
                    .with_current_ref(Some(&current)),
            )
            .expect("instantiate should succeed");

        assert_eq!(obj.metadata.name.as_deref(), Some("c1-abc123"));
    }

    /// Story: Reusing the current control plane name must not draw a random
    /// name at all, and a fresh object draws exactly one.
    #[test]
    fn story_object_name_is_drawn_at_most_once() {
        let template = control_plane_template();
        let template_ref = to_reference(&template);
        let cluster = cluster();
        let current = ObjectReference {
            name: "c1-abc123".to_string(),
            ..Default::default()
        };

        let mut unused = MockNameGenerator::new();
        unused.expect_generate().never();
        TemplateInstantiator::new(Arc::new(unused))
            .instantiate_object(
                TemplateInput::new(&template, &template_ref, &cluster, "c1-")
                    .with_current_ref(Some(&current)),
            )
            .expect("instantiate should succeed");

        let mut once = MockNameGenerator::new();
        once.expect_generate()
            .withf(|prefix| prefix == "c1-")
            .times(1)
            .returning(|prefix| format!("{}zz9zz", prefix));
        let obj = TemplateInstantiator::new(Arc::new(once))
            .instantiate_object(TemplateInput::new(&template, &template_ref, &cluster, "c1-"))
            .expect("instantiate should succeed");

        assert_eq!(obj.metadata.name.as_deref(), Some("c1-zz9zz"));
    }

    #[test]
    fn test_fresh_name_uses_prefix() {
        let template = control_plane_template();
        let template_ref = to_reference(&template);
        let cluster = cluster();
        let empty = ObjectReference::default();

        let obj = instantiator()
            .instantiate_object(
                TemplateInput::new(&template, &template_ref, &cluster, "c1-")
                    .with_current_ref(Some(&empty)),
            )
            .expect("instantiate should succeed");

        assert_eq!(obj.metadata.name.as_deref(), Some("c1-abcde"));
    }

    #[test]
    fn test_object_gets_identity_labels_and_cluster_namespace() {
        let template = control_plane_template();
        let template_ref = to_reference(&template);
        let cluster = cluster();
        let requested = BTreeMap::from([
            (CLUSTER_TOPOLOGY_OWNED_LABEL.to_string(), "spoofed".to_string()),
            ("tier".to_string(), "cp".to_string()),
        ]);

        let obj = instantiator()
            .instantiate_object(
                TemplateInput::new(&template, &template_ref, &cluster, "c1-")
                    .with_metadata(requested, BTreeMap::new()),
            )
            .expect("instantiate should succeed");

        assert_eq!(labels(&obj)[CLUSTER_NAME_LABEL], "c1");
        assert_eq!(labels(&obj)[CLUSTER_TOPOLOGY_OWNED_LABEL], "");
        assert_eq!(labels(&obj)["tier"], "cp");
        assert_eq!(obj.metadata.namespace.as_deref(), Some("ns"));
        assert!(obj.metadata.owner_references.is_none());
    }

    #[test]
    fn test_template_copy_layers_metadata() {
        let template = machine_template();
        let template_ref = to_reference(&template);
        let cluster = cluster();

        let copy = instantiator().instantiate_template(
            TemplateInput::new(&template, &template_ref, &cluster, "c1-controlplane-").with_metadata(
                BTreeMap::from([("tier".to_string(), "cp".to_string())]),
                BTreeMap::from([("note".to_string(), "cluster".to_string())]),
            ),
        );

        assert_eq!(copy.metadata.name.as_deref(), Some("c1-controlplane-abcde"));
        assert_eq!(labels(&copy)["from-template"], "yes");
        assert_eq!(labels(&copy)["tier"], "cp");
        assert_eq!(labels(&copy)[CLUSTER_NAME_LABEL], "c1");
        assert_eq!(labels(&copy)[CLUSTER_TOPOLOGY_OWNED_LABEL], "");
        assert_eq!(annotations(&copy)["note"], "cluster");
        assert_eq!(
            annotations(&copy)[TEMPLATE_CLONED_FROM_NAME_ANNOTATION],
            "cp-machines"
        );
        assert_eq!(
            annotations(&copy)[TEMPLATE_CLONED_FROM_GROUP_KIND_ANNOTATION],
            "DockerMachineTemplate.infrastructure.cluster.x-k8s.io"
        );
        assert_eq!(copy.data, template.data);
    }

    #[test]
    fn test_template_copy_leaves_original_untouched() {
        let template = machine_template();
        let before = template.clone();
        let template_ref = to_reference(&template);
        let cluster = cluster();

        instantiator()
            .instantiate_template(TemplateInput::new(&template, &template_ref, &cluster, "c1-"));

        assert_eq!(template.metadata, before.metadata);
        assert_eq!(template.data, before.data);
    }

    #[test]
    fn test_invalid_template_propagates() {
        let template = machine_template();
        let broken: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta1",
            "kind": "DockerClusterTemplate",
            "metadata": { "name": "broken" },
            "spec": {}
        }))
        .expect("template should deserialize");
        let template_ref = to_reference(&template);
        let cluster = cluster();

        let result = instantiator()
            .instantiate_object(TemplateInput::new(&broken, &template_ref, &cluster, "c1-"));
        assert!(matches!(result, Err(TopologyError::InvalidTemplate { .. })));
    }
}
