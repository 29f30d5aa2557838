//! Desired-state compilation for managed topologies
//!
//! The compiler turns a loaded [`TopologyClass`] and the current
//! [`TopologyState`] of a Cluster into a complete [`DesiredState`]. Each
//! component is produced by its own [`ComponentGenerator`], run in a fixed
//! order because later components reference earlier ones:
//!
//! 1. infrastructure cluster
//! 2. control plane machine infrastructure template (if the class has one)
//! 3. control plane, referencing (2)
//! 4. Cluster, referencing (1) and (3)
//! 5. machine deployments (not computed yet)
//!
//! The first failing step aborts the computation; no partial state is
//! returned.

use std::collections::BTreeMap;

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::json;
use tracing::debug;

use lattice_common::crd::{Cluster, Topology};

use crate::constants::{
    CONTROL_PLANE_INFRASTRUCTURE_REF_PATH, CONTROL_PLANE_NAME_INFIX, CONTROL_PLANE_REPLICAS_PATH,
    CONTROL_PLANE_VERSION_PATH,
};
use crate::error::TopologyError;
use crate::labels::{enforce_topology_labels, merge_maps};
use crate::reference::{
    get_nested_ref, object_kind, set_nested_field, set_nested_ref, to_reference, FieldPath,
};
use crate::state::{
    ClassTemplate, DesiredControlPlane, DesiredState, MachineDeploymentState, TopologyClass,
    TopologyState,
};
use crate::template::{TemplateInput, TemplateInstantiator};

/// Produces one component of the desired state
pub trait ComponentGenerator {
    /// Component name used in error context
    const COMPONENT: &'static str;

    /// What the generator produces
    type Output;

    /// Kind of the template the component is generated from
    fn template_kind(&self) -> String;

    /// Generate the component
    fn generate(&self) -> Result<Self::Output, TopologyError>;
}

/// Run a generator, tagging any failure with its component and template kind
fn run<G: ComponentGenerator>(generator: G) -> Result<G::Output, TopologyError> {
    generator
        .generate()
        .map_err(|e| e.in_component(G::COMPONENT, generator.template_kind()))
}

/// Infrastructure cluster object (e.g. `DockerCluster`)
struct InfrastructureClusterGenerator<'a> {
    instantiator: &'a TemplateInstantiator,
    template: &'a ClassTemplate,
    cluster: &'a Cluster,
}

impl ComponentGenerator for InfrastructureClusterGenerator<'_> {
    const COMPONENT: &'static str = "InfrastructureCluster";
    type Output = DynamicObject;

    fn template_kind(&self) -> String {
        self.template.kind()
    }

    fn generate(&self) -> Result<DynamicObject, TopologyError> {
        self.instantiator.instantiate_object(
            TemplateInput::new(
                &self.template.object,
                &self.template.reference,
                self.cluster,
                format!("{}-", self.cluster.name_any()),
            )
            .with_current_ref(self.cluster.spec.infrastructure_ref.as_ref()),
        )
    }
}

/// Per-cluster copy of the control plane machine infrastructure template
struct ControlPlaneInfrastructureMachineTemplateGenerator<'a> {
    instantiator: &'a TemplateInstantiator,
    class: &'a TopologyClass,
    template: &'a ClassTemplate,
    topology: &'a Topology,
    current: &'a TopologyState,
}

impl ComponentGenerator for ControlPlaneInfrastructureMachineTemplateGenerator<'_> {
    const COMPONENT: &'static str = "ControlPlane InfrastructureMachineTemplate";
    type Output = DynamicObject;

    fn template_kind(&self) -> String {
        self.template.kind()
    }

    fn generate(&self) -> Result<DynamicObject, TopologyError> {
        let cluster = &self.current.cluster;
        let current_ref = match &self.current.control_plane.object {
            Some(cp) => Some(get_nested_ref(
                cp,
                &FieldPath::new(CONTROL_PLANE_INFRASTRUCTURE_REF_PATH),
            )?),
            None => None,
        };
        let template_ref = to_reference(&self.template.object);
        let (labels, annotations) = control_plane_metadata(self.class, self.topology);

        Ok(self.instantiator.instantiate_template(
            TemplateInput::new(
                &self.template.object,
                &template_ref,
                cluster,
                format!("{}-{}-", cluster.name_any(), CONTROL_PLANE_NAME_INFIX),
            )
            .with_current_ref(current_ref.as_ref())
            .with_metadata(labels, annotations),
        ))
    }
}

/// Control plane object (e.g. `KubeadmControlPlane`)
struct ControlPlaneGenerator<'a> {
    instantiator: &'a TemplateInstantiator,
    class: &'a TopologyClass,
    topology: &'a Topology,
    cluster: &'a Cluster,
    infrastructure_machine_template: Option<&'a DynamicObject>,
}

impl ComponentGenerator for ControlPlaneGenerator<'_> {
    const COMPONENT: &'static str = "ControlPlane";
    type Output = DynamicObject;

    fn template_kind(&self) -> String {
        self.class.control_plane.template.kind()
    }

    fn generate(&self) -> Result<DynamicObject, TopologyError> {
        let template = &self.class.control_plane.template;
        let (labels, annotations) = control_plane_metadata(self.class, self.topology);

        let mut control_plane = self.instantiator.instantiate_object(
            TemplateInput::new(
                &template.object,
                &template.reference,
                self.cluster,
                format!("{}-", self.cluster.name_any()),
            )
            .with_current_ref(self.cluster.spec.control_plane_ref.as_ref())
            .with_metadata(labels, annotations),
        )?;

        if let Some(machine_template) = self.infrastructure_machine_template {
            set_nested_ref(
                &mut control_plane,
                machine_template,
                &FieldPath::new(CONTROL_PLANE_INFRASTRUCTURE_REF_PATH),
            )?;
        }

        // Providers without replica support get no replicas field at all
        if let Some(replicas) = self.topology.control_plane.replicas {
            set_nested_field(
                &mut control_plane,
                &FieldPath::new(CONTROL_PLANE_REPLICAS_PATH),
                json!(i64::from(replicas)),
            )?;
        }

        set_nested_field(
            &mut control_plane,
            &FieldPath::new(CONTROL_PLANE_VERSION_PATH),
            json!(self.topology.version),
        )?;

        Ok(control_plane)
    }
}

/// The Cluster itself, pointing at its infrastructure and control plane
struct ClusterGenerator<'a> {
    current: &'a Cluster,
    infrastructure_cluster: &'a DynamicObject,
    control_plane: &'a DynamicObject,
}

impl ComponentGenerator for ClusterGenerator<'_> {
    const COMPONENT: &'static str = "Cluster";
    type Output = Cluster;

    fn template_kind(&self) -> String {
        "Cluster".to_string()
    }

    fn generate(&self) -> Result<Cluster, TopologyError> {
        let mut cluster = self.current.clone();
        let name = cluster.name_any();

        let labels = cluster.metadata.labels.take().unwrap_or_default();
        cluster.metadata.labels = Some(enforce_topology_labels(&labels, &name));

        cluster.spec.infrastructure_ref = Some(to_reference(self.infrastructure_cluster));
        cluster.spec.control_plane_ref = Some(to_reference(self.control_plane));

        Ok(cluster)
    }
}

/// Worker pools
///
/// Not computed yet: always yields no machine deployments, whatever worker
/// classes the ClusterClass declares.
struct MachineDeploymentGenerator<'a> {
    class: &'a TopologyClass,
}

impl ComponentGenerator for MachineDeploymentGenerator<'_> {
    const COMPONENT: &'static str = "MachineDeployment";
    type Output = Vec<MachineDeploymentState>;

    fn template_kind(&self) -> String {
        "MachineDeployment".to_string()
    }

    fn generate(&self) -> Result<Vec<MachineDeploymentState>, TopologyError> {
        debug!(
            worker_classes = self.class.machine_deployments.len(),
            "Machine deployments are not computed"
        );
        Ok(Vec::new())
    }
}

/// Labels and annotations for control plane objects; the Cluster's topology
/// wins over the ClusterClass
fn control_plane_metadata(
    class: &TopologyClass,
    topology: &Topology,
) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let class_metadata = &class.cluster_class.spec.control_plane.metadata;
    let topology_metadata = &topology.control_plane.metadata;
    (
        merge_maps(&topology_metadata.labels, &class_metadata.labels),
        merge_maps(&topology_metadata.annotations, &class_metadata.annotations),
    )
}

/// Computes desired states of managed topologies
#[derive(Clone, Default)]
pub struct TopologyCompiler {
    instantiator: TemplateInstantiator,
}

impl TopologyCompiler {
    /// Compiler instantiating templates with `instantiator`
    pub fn new(instantiator: TemplateInstantiator) -> Self {
        Self { instantiator }
    }

    /// Compute the full desired state of a Cluster from its class and current state
    pub fn compute_desired_state(
        &self,
        class: &TopologyClass,
        current: &TopologyState,
    ) -> Result<DesiredState, TopologyError> {
        let cluster = &current.cluster;
        let topology = cluster
            .topology()
            .ok_or_else(|| TopologyError::TopologyNotDefined {
                cluster: cluster.name_any(),
            })?;

        let infrastructure_cluster = run(InfrastructureClusterGenerator {
            instantiator: &self.instantiator,
            template: &class.infrastructure_cluster_template,
            cluster,
        })?;
        debug!(
            kind = %object_kind(&infrastructure_cluster),
            name = %infrastructure_cluster.name_any(),
            "Computed infrastructure cluster"
        );

        let infrastructure_machine_template = class
            .control_plane
            .infrastructure_machine_template
            .as_ref()
            .map(|template| {
                run(ControlPlaneInfrastructureMachineTemplateGenerator {
                    instantiator: &self.instantiator,
                    class,
                    template,
                    topology,
                    current,
                })
            })
            .transpose()?;

        let control_plane = run(ControlPlaneGenerator {
            instantiator: &self.instantiator,
            class,
            topology,
            cluster,
            infrastructure_machine_template: infrastructure_machine_template.as_ref(),
        })?;
        debug!(
            kind = %object_kind(&control_plane),
            name = %control_plane.name_any(),
            "Computed control plane"
        );

        let desired_cluster = run(ClusterGenerator {
            current: cluster,
            infrastructure_cluster: &infrastructure_cluster,
            control_plane: &control_plane,
        })?;

        let machine_deployments = run(MachineDeploymentGenerator { class })?;

        Ok(DesiredState {
            cluster: desired_cluster,
            infrastructure_cluster,
            control_plane: DesiredControlPlane {
                object: control_plane,
                infrastructure_machine_template,
            },
            machine_deployments,
        })
    }
}
