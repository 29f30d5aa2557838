//! Centralized constants for the lattice-topology crate

// =============================================================================
// Labels and Annotations
// =============================================================================

/// Label naming the Cluster an object belongs to
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Label marking an object as owned by a managed topology (always empty-valued)
pub const CLUSTER_TOPOLOGY_OWNED_LABEL: &str = "topology.cluster.x-k8s.io/owned";

/// Annotation pausing reconciliation of a Cluster, whatever its value
pub const PAUSED_ANNOTATION: &str = "cluster.x-k8s.io/paused";

/// Annotation recording the name of the template an object was cloned from
pub const TEMPLATE_CLONED_FROM_NAME_ANNOTATION: &str = "cluster.x-k8s.io/cloned-from-name";

/// Annotation recording the group-kind of the template an object was cloned from
pub const TEMPLATE_CLONED_FROM_GROUP_KIND_ANNOTATION: &str =
    "cluster.x-k8s.io/cloned-from-groupkind";

// =============================================================================
// Field Paths
// =============================================================================

/// Where a control plane object references its machine infrastructure template
pub const CONTROL_PLANE_INFRASTRUCTURE_REF_PATH: &[&str] =
    &["spec", "machineTemplate", "infrastructureRef"];

/// Control plane replica count
pub const CONTROL_PLANE_REPLICAS_PATH: &[&str] = &["spec", "replicas"];

/// Control plane Kubernetes version
pub const CONTROL_PLANE_VERSION_PATH: &[&str] = &["spec", "version"];

/// Body of a template object
pub const TEMPLATE_BODY_PATH: &[&str] = &["spec", "template"];

// =============================================================================
// Naming
// =============================================================================

/// Infix between the cluster name and the generated suffix of control plane
/// machine templates
pub const CONTROL_PLANE_NAME_INFIX: &str = "controlplane";

/// Suffix stripped from a template kind to get the kind of the objects it produces
pub const TEMPLATE_KIND_SUFFIX: &str = "Template";

// =============================================================================
// Contracts
// =============================================================================

/// Cluster API contract version references are normalized to by default
pub const DEFAULT_CONTRACT: &str = "v1beta1";

/// Label prefix on provider CRDs listing the versions served for a contract
pub const CONTRACT_LABEL_PREFIX: &str = "cluster.x-k8s.io";
