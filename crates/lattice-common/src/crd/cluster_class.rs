//! Cluster API `ClusterClass` resource
//!
//! A ClusterClass is a reusable set of template references describing how
//! the infrastructure, control plane, and worker pools of a cluster look.
//! Fields the topology controller does not read (variables, patches, health
//! checks, ...) are kept as raw JSON so a corrected class can be written back
//! without losing them.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ObjectMetadata, ObjectReference};

/// Specification of a ClusterClass
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "ClusterClass",
    plural = "clusterclasses",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterClassSpec {
    /// Template for the infrastructure cluster object
    #[serde(default)]
    pub infrastructure: LocalObjectTemplate,

    /// Templates for the control plane
    #[serde(default)]
    pub control_plane: ControlPlaneClass,

    /// Worker classes
    #[serde(default)]
    pub workers: WorkersClass,

    /// Fields not modeled here, passed through verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Reference to a template in the same namespace as the ClusterClass
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct LocalObjectTemplate {
    /// The template reference
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ObjectReference>,
}

/// Control plane section of a ClusterClass
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneClass {
    /// Labels and annotations applied to the control plane objects
    #[serde(default)]
    pub metadata: ObjectMetadata,

    /// Control plane template reference
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ObjectReference>,

    /// Machine infrastructure template for control plane machines, only for
    /// control plane providers that run on machines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_infrastructure: Option<LocalObjectTemplate>,

    /// Fields not modeled here, passed through verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Worker section of a ClusterClass
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkersClass {
    /// Machine deployment classes, keyed by their `class` name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub machine_deployments: Vec<MachineDeploymentClass>,

    /// Fields not modeled here, passed through verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A worker class that machine deployments in a topology can reference
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineDeploymentClass {
    /// Worker class name
    pub class: String,
    /// Templates for machines in this class
    #[serde(default)]
    pub template: MachineDeploymentClassTemplate,

    /// Fields not modeled here, passed through verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Templates of a worker class
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineDeploymentClassTemplate {
    /// Labels and annotations for machine deployments of this class
    #[serde(default)]
    pub metadata: ObjectMetadata,
    /// Bootstrap config template
    #[serde(default)]
    pub bootstrap: LocalObjectTemplate,
    /// Machine infrastructure template
    #[serde(default)]
    pub infrastructure: LocalObjectTemplate,
}

impl ClusterClass {
    /// Whether the class declares a control plane machine infrastructure template
    pub fn has_control_plane_machine_infrastructure(&self) -> bool {
        self.spec
            .control_plane
            .machine_infrastructure
            .as_ref()
            .is_some_and(|mi| mi.reference.is_some())
    }
}
