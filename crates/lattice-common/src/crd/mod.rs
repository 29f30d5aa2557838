//! Cluster API resource definitions
//!
//! Typed views of the `cluster.x-k8s.io` resources the topology controller
//! reads: the managed `Cluster` and the `ClusterClass` it is built from.
//! Provider templates stay untyped (`DynamicObject`) since any provider can
//! plug its kinds into a ClusterClass.

mod cluster;
mod cluster_class;
mod types;

pub use cluster::{
    ApiEndpoint, Cluster, ClusterSpec, ClusterStatus, ControlPlaneTopology,
    MachineDeploymentTopology, Topology, WorkersTopology,
};
pub use cluster_class::{
    ClusterClass, ClusterClassSpec, ControlPlaneClass, LocalObjectTemplate,
    MachineDeploymentClass, MachineDeploymentClassTemplate, WorkersClass,
};
pub use types::{ObjectMetadata, ObjectReference};
