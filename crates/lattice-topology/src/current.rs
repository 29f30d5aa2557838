//! Reading the current state of a managed Cluster
//!
//! Follows the references held by the Cluster (and by its control plane) to
//! the objects that exist today. Anything not created yet is `None`.

use kube::api::DynamicObject;
use kube::ResourceExt;
use tracing::{debug, instrument};

use lattice_common::crd::{Cluster, ObjectReference};

use crate::constants::CONTROL_PLANE_INFRASTRUCTURE_REF_PATH;
use crate::error::TopologyError;
use crate::reference::{get_nested_ref, FieldPath};
use crate::state::{ControlPlaneState, TopologyState};
use crate::store::ObjectStore;

/// Read the objects currently referenced by a Cluster
///
/// Worker pools are not read; `machine_deployments` is always empty.
#[instrument(skip_all, fields(cluster = %cluster.name_any()))]
pub async fn get_current_state(
    store: &dyn ObjectStore,
    cluster: &Cluster,
) -> Result<TopologyState, TopologyError> {
    let namespace = cluster.namespace().unwrap_or_default();

    let infrastructure_cluster =
        fetch_referenced(store, cluster.spec.infrastructure_ref.as_ref(), &namespace).await?;
    let control_plane =
        fetch_referenced(store, cluster.spec.control_plane_ref.as_ref(), &namespace).await?;

    let infra_ref_path = FieldPath::new(CONTROL_PLANE_INFRASTRUCTURE_REF_PATH);
    let infrastructure_machine_template = match &control_plane {
        Some(cp) if infra_ref_path.contains(&cp.data) => {
            let reference = get_nested_ref(cp, &infra_ref_path)?;
            fetch_referenced(store, Some(&reference), &namespace).await?
        }
        _ => None,
    };

    debug!(
        infrastructure_cluster = infrastructure_cluster.is_some(),
        control_plane = control_plane.is_some(),
        control_plane_machine_template = infrastructure_machine_template.is_some(),
        "Read current state"
    );

    let mut state = TopologyState::new(cluster.clone());
    state.infrastructure_cluster = infrastructure_cluster;
    state.control_plane = ControlPlaneState {
        object: control_plane,
        infrastructure_machine_template,
    };
    Ok(state)
}

/// Fetch the object a reference points to
///
/// A missing or unnamed reference, or an object that no longer exists,
/// yields `None`. An empty namespace means `default_namespace`.
async fn fetch_referenced(
    store: &dyn ObjectStore,
    reference: Option<&ObjectReference>,
    default_namespace: &str,
) -> Result<Option<DynamicObject>, TopologyError> {
    let Some(reference) = reference.filter(|r| !r.name.is_empty()) else {
        return Ok(None);
    };

    let mut lookup = reference.clone();
    if lookup.namespace.is_empty() {
        lookup.namespace = default_namespace.to_string();
    }

    store
        .get_object(&lookup)
        .await
        .map_err(|e| TopologyError::fetch(&lookup, e))
}
