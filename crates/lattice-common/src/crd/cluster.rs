//! Cluster API `Cluster` resource
//!
//! Only the fields the topology controller reads or writes are typed. Every
//! other field (`clusterNetwork`, `topology.variables`, `status.conditions`,
//! ...) is kept as raw JSON so a desired-state copy passes it through
//! unchanged.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ObjectMetadata, ObjectReference};

/// Specification of a Cluster API Cluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Cluster",
    plural = "clusters",
    namespaced,
    status = "ClusterStatus",
    printcolumn = r#"{"name":"ClusterClass","type":"string","jsonPath":".spec.topology.class"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.topology.version"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Whether reconciliation of this cluster is paused
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub paused: bool,

    /// Cluster network configuration, passed through verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_network: Option<serde_json::Value>,

    /// Endpoint used to communicate with the control plane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ApiEndpoint>,

    /// Reference to the provider-specific control plane object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_ref: Option<ObjectReference>,

    /// Reference to the provider-specific infrastructure cluster object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_ref: Option<ObjectReference>,

    /// Managed topology; when set the cluster is shaped by a ClusterClass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<Topology>,

    /// Fields not modeled here, passed through verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Host and port of an API endpoint
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    /// Hostname or IP
    #[serde(default)]
    pub host: String,
    /// Port
    #[serde(default)]
    pub port: i32,
}

/// Managed topology of a cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    /// Name of the ClusterClass, in the cluster's namespace
    pub class: String,

    /// Kubernetes version the cluster should run
    pub version: String,

    /// Control plane overrides
    #[serde(default)]
    pub control_plane: ControlPlaneTopology,

    /// Worker pools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<WorkersTopology>,

    /// Fields not modeled here, passed through verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Control plane section of a topology
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneTopology {
    /// Labels and annotations applied to the control plane objects.
    /// Wins over the ClusterClass control plane metadata on key collision.
    #[serde(default)]
    pub metadata: ObjectMetadata,

    /// Desired number of control plane replicas.
    ///
    /// Absent when the control plane provider does not support replicas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Fields not modeled here, passed through verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Worker section of a topology
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkersTopology {
    /// Machine deployments to create from the class worker definitions
    #[serde(default)]
    pub machine_deployments: Vec<MachineDeploymentTopology>,

    /// Fields not modeled here, passed through verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A machine deployment in a topology
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineDeploymentTopology {
    /// Labels and annotations for the machine deployment
    #[serde(default)]
    pub metadata: ObjectMetadata,
    /// Worker class in the ClusterClass this deployment is built from
    pub class: String,
    /// Unique name of this deployment within the topology
    pub name: String,
    /// Desired number of worker replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Fields not modeled here, passed through verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Observed state of a Cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Lifecycle phase reported by the core Cluster API controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Whether the infrastructure cluster is ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_ready: Option<bool>,
    /// Whether the control plane is ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_ready: Option<bool>,
    /// Generation last observed by the core controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Fields not modeled here, passed through verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Cluster {
    /// Topology of the cluster, if it is managed by a ClusterClass
    pub fn topology(&self) -> Option<&Topology> {
        self.spec.topology.as_ref()
    }
}
