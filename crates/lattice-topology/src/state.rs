//! Inputs and outputs of a topology computation
//!
//! A [`TopologyClass`] is everything loaded from a ClusterClass, a
//! [`TopologyState`] is what currently exists for a Cluster, and a
//! [`DesiredState`] is what should exist. All three are built per reconcile
//! and dropped afterwards.

use std::collections::BTreeMap;

use kube::api::DynamicObject;

use lattice_common::crd::{Cluster, ClusterClass, ObjectReference};

use crate::reference::object_kind;

/// A template loaded from a ClusterClass, with the reference it was loaded through
#[derive(Clone, Debug)]
pub struct ClassTemplate {
    /// Reference, normalized to the current API contract
    pub reference: ObjectReference,
    /// The template object
    pub object: DynamicObject,
}

impl ClassTemplate {
    /// Kind of the template object
    pub fn kind(&self) -> String {
        object_kind(&self.object)
    }
}

/// Snapshot of a ClusterClass and every template it references
#[derive(Clone, Debug)]
pub struct TopologyClass {
    /// The ClusterClass, with references normalized
    pub cluster_class: ClusterClass,
    /// Infrastructure cluster template
    pub infrastructure_cluster_template: ClassTemplate,
    /// Control plane templates
    pub control_plane: ControlPlaneTopologyClass,
    /// Worker templates keyed by worker class name
    pub machine_deployments: BTreeMap<String, MachineDeploymentTopologyClass>,
}

/// Templates for a managed control plane
#[derive(Clone, Debug)]
pub struct ControlPlaneTopologyClass {
    /// Control plane template
    pub template: ClassTemplate,
    /// Machine infrastructure template, when the control plane runs on machines
    pub infrastructure_machine_template: Option<ClassTemplate>,
}

/// Templates for one worker class
#[derive(Clone, Debug)]
pub struct MachineDeploymentTopologyClass {
    /// Bootstrap config template
    pub bootstrap_template: ClassTemplate,
    /// Machine infrastructure template
    pub infrastructure_machine_template: ClassTemplate,
}

/// Objects that currently exist for a managed Cluster
#[derive(Clone, Debug)]
pub struct TopologyState {
    /// The Cluster
    pub cluster: Cluster,
    /// Infrastructure cluster object, if created
    pub infrastructure_cluster: Option<DynamicObject>,
    /// Control plane objects
    pub control_plane: ControlPlaneState,
    /// Worker pools; not tracked yet, always empty
    pub machine_deployments: Vec<MachineDeploymentState>,
}

impl TopologyState {
    /// State of a Cluster none of whose objects exist yet
    pub fn new(cluster: Cluster) -> Self {
        Self {
            cluster,
            infrastructure_cluster: None,
            control_plane: ControlPlaneState::default(),
            machine_deployments: Vec::new(),
        }
    }
}

/// Current control plane objects
#[derive(Clone, Debug, Default)]
pub struct ControlPlaneState {
    /// Control plane object, if created
    pub object: Option<DynamicObject>,
    /// Machine infrastructure template the control plane references, if any
    pub infrastructure_machine_template: Option<DynamicObject>,
}

/// Objects making up one worker pool
#[derive(Clone, Debug)]
pub struct MachineDeploymentState {
    /// The MachineDeployment
    pub object: DynamicObject,
    /// Bootstrap config template
    pub bootstrap_template: DynamicObject,
    /// Machine infrastructure template
    pub infrastructure_machine_template: DynamicObject,
}

/// Fully computed target state for a managed Cluster
#[derive(Clone, Debug)]
pub struct DesiredState {
    /// The Cluster with references to the objects below
    pub cluster: Cluster,
    /// Infrastructure cluster object
    pub infrastructure_cluster: DynamicObject,
    /// Control plane objects
    pub control_plane: DesiredControlPlane,
    /// Worker pools; not computed yet, always empty
    pub machine_deployments: Vec<MachineDeploymentState>,
}

/// Desired control plane objects
#[derive(Clone, Debug)]
pub struct DesiredControlPlane {
    /// Control plane object
    pub object: DynamicObject,
    /// Machine infrastructure template, present iff the class declares one
    pub infrastructure_machine_template: Option<DynamicObject>,
}
