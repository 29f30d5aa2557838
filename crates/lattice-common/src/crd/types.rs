//! Supporting types shared by Cluster and ClusterClass

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::kube_utils::parse_api_version;

/// Reference to another object by apiVersion, kind, namespace, and name
///
/// Mirrors the subset of `corev1.ObjectReference` that Cluster API uses for
/// template and infrastructure references. Missing fields deserialize to
/// empty strings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// API version of the referent (e.g., "infrastructure.cluster.x-k8s.io/v1beta1")
    #[serde(default)]
    pub api_version: String,
    /// Kind of the referent
    #[serde(default)]
    pub kind: String,
    /// Namespace of the referent
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Name of the referent
    #[serde(default)]
    pub name: String,
}

impl ObjectReference {
    /// API group of the referent, empty for the core group
    pub fn group(&self) -> String {
        parse_api_version(&self.api_version).0
    }

    /// Group-kind string in `Kind.group` form (`Kind` for the core group)
    pub fn group_kind(&self) -> String {
        let group = self.group();
        if group.is_empty() {
            self.kind.clone()
        } else {
            format!("{}.{}", self.kind, group)
        }
    }
}

/// Labels and annotations that a topology or class applies to generated objects
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    /// Labels to add
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations to add
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}
