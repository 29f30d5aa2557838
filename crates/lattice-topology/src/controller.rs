//! Cluster topology controller
//!
//! Watches Clusters with a managed topology and computes their desired
//! state on every change and on a fixed resync interval. Objects are not
//! written back yet; each reconcile logs what the topology should look like.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument};

use lattice_common::crd::Cluster;

use crate::class::ClassLoader;
use crate::compiler::TopologyCompiler;
use crate::config::TopologyConfig;
use crate::constants::PAUSED_ANNOTATION;
use crate::contract::{ContractNormalizer, CrdContractNormalizer};
use crate::current::get_current_state;
use crate::error::TopologyError;
use crate::reference::object_kind;
use crate::store::{KubeObjectStore, ObjectStore};

/// Requeue delay after a retryable failure
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Shared state for the topology controller
pub struct Context {
    /// ClusterClass and template loading
    pub classes: ClassLoader,
    /// Object access for current-state reads
    pub store: Arc<dyn ObjectStore>,
    /// Desired-state computation
    pub compiler: TopologyCompiler,
    /// Controller settings
    pub config: TopologyConfig,
}

impl Context {
    /// Context backed by the API server behind `client`
    pub fn new(client: Client, config: TopologyConfig) -> Self {
        let store: Arc<dyn ObjectStore> = Arc::new(KubeObjectStore::new(client.clone()));
        let normalizer: Arc<dyn ContractNormalizer> =
            Arc::new(CrdContractNormalizer::new(client, config.contract.clone()));
        Self::from_parts(store, normalizer, TopologyCompiler::default(), config)
    }

    /// Context assembled from explicit collaborators
    pub fn from_parts(
        store: Arc<dyn ObjectStore>,
        normalizer: Arc<dyn ContractNormalizer>,
        compiler: TopologyCompiler,
        config: TopologyConfig,
    ) -> Self {
        Self {
            classes: ClassLoader::new(store.clone(), normalizer),
            store,
            compiler,
            config,
        }
    }
}

/// Check whether reconciliation of a Cluster is paused
fn is_paused(cluster: &Cluster) -> bool {
    cluster.spec.paused || cluster.annotations().contains_key(PAUSED_ANNOTATION)
}

/// Reconcile a Cluster with a managed topology
///
/// Clusters without a topology, and paused Clusters, are left alone until
/// they change.
#[instrument(skip(cluster, ctx), fields(cluster = %cluster.name_any()))]
pub async fn reconcile(cluster: Arc<Cluster>, ctx: Arc<Context>) -> Result<Action, TopologyError> {
    if cluster.topology().is_none() {
        debug!("Cluster has no managed topology, skipping");
        return Ok(Action::await_change());
    }
    if is_paused(&cluster) {
        info!("Cluster is paused, skipping");
        return Ok(Action::await_change());
    }

    let class = ctx.classes.get_class(&cluster).await?;
    let current = get_current_state(ctx.store.as_ref(), &cluster).await?;
    let desired = ctx.compiler.compute_desired_state(&class, &current)?;

    info!(
        class = %class.cluster_class.name_any(),
        machine_based_control_plane = class.cluster_class.has_control_plane_machine_infrastructure(),
        infrastructure_cluster = %desired.infrastructure_cluster.name_any(),
        infrastructure_cluster_kind = %object_kind(&desired.infrastructure_cluster),
        control_plane = %desired.control_plane.object.name_any(),
        control_plane_kind = %object_kind(&desired.control_plane.object),
        control_plane_machine_template = ?desired
            .control_plane
            .infrastructure_machine_template
            .as_ref()
            .map(|t| t.name_any()),
        "Computed desired topology state"
    );

    Ok(Action::requeue(ctx.config.resync_interval))
}

/// Requeue policy for failed reconciles
///
/// Failures that need an edit to the Cluster or ClusterClass wait for the
/// resync interval instead of hammering the API server.
pub fn error_policy(cluster: Arc<Cluster>, error: &TopologyError, ctx: Arc<Context>) -> Action {
    error!(
        %error,
        cluster = %cluster.name_any(),
        retryable = error.is_retryable(),
        "Topology reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(RETRY_DELAY)
    } else {
        Action::requeue(ctx.config.resync_interval)
    }
}
