//! Label and annotation merging
//!
//! Topology metadata comes from two levels, the Cluster's topology and the
//! ClusterClass. Merges always build a new map so the inputs, which are
//! usually borrowed from cached resources, are never touched.

use std::collections::BTreeMap;

use crate::constants::{CLUSTER_NAME_LABEL, CLUSTER_TOPOLOGY_OWNED_LABEL};

/// Merge two maps; on key collision the value from `primary` wins
///
/// An absent map is passed as an empty one.
pub fn merge_maps(
    primary: &BTreeMap<String, String>,
    secondary: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = secondary.clone();
    merged.extend(primary.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Copy of `labels` with the topology identity labels set for `cluster_name`
///
/// The identity labels replace any caller-supplied value for the same keys.
pub fn enforce_topology_labels(
    labels: &BTreeMap<String, String>,
    cluster_name: &str,
) -> BTreeMap<String, String> {
    let mut enforced = labels.clone();
    enforced.insert(CLUSTER_NAME_LABEL.to_string(), cluster_name.to_string());
    enforced.insert(CLUSTER_TOPOLOGY_OWNED_LABEL.to_string(), String::new());
    enforced
}
