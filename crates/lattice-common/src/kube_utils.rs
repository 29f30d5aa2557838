//! Shared Kubernetes utilities using kube-rs
//!
//! Cluster API templates are addressed by whatever apiVersion/kind a
//! ClusterClass names, so most access goes through `DynamicObject` with an
//! `ApiResource` built from a reference at runtime. Plurals of provider
//! kinds come from API discovery; the English-rules guess is only used when
//! discovery does not know the kind.

use std::path::Path;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::{ApiResource, Discovery};
use kube::{Client, Config};
use tracing::debug;

use crate::Error;

/// Default connect timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients (must exceed watcher timeouts)
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Build an ApiResource from a known apiVersion and kind.
///
/// The version you provide is used exactly, which is what we want for
/// references that were already normalized to the current contract.
///
/// # Example
/// ```ignore
/// let ar = build_api_resource("infrastructure.cluster.x-k8s.io/v1beta1", "DockerClusterTemplate");
/// let api: Api<DynamicObject> = Api::namespaced_with(client, "default", &ar);
/// ```
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Parse apiVersion into (group, version)
///
/// # Examples
/// ```
/// use lattice_common::kube_utils::parse_api_version;
///
/// let (group, version) = parse_api_version("cluster.x-k8s.io/v1beta1");
/// assert_eq!(group, "cluster.x-k8s.io");
/// assert_eq!(version, "v1beta1");
///
/// let (group, version) = parse_api_version("v1");
/// assert_eq!(group, "");
/// assert_eq!(version, "v1");
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Known Cluster API pluralizations
const KIND_PLURALS: &[(&str, &str)] = &[
    ("cluster", "clusters"),
    ("clusterclass", "clusterclasses"),
    ("machine", "machines"),
    ("machinedeployment", "machinedeployments"),
    ("machineset", "machinesets"),
    ("kubeadmcontrolplane", "kubeadmcontrolplanes"),
    (
        "kubeadmcontrolplanetemplate",
        "kubeadmcontrolplanetemplates",
    ),
    ("kubeadmconfigtemplate", "kubeadmconfigtemplates"),
    ("dockerclustertemplate", "dockerclustertemplates"),
    ("dockermachinetemplate", "dockermachinetemplates"),
];

/// Pluralize a Kubernetes resource kind
///
/// Uses a lookup table for known Cluster API types, falling back to simple
/// English pluralization for provider kinds we have never seen.
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if let Some((_, plural)) = KIND_PLURALS.iter().find(|(singular, _)| *singular == lower) {
        return (*plural).to_string();
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Resolve the ApiResource for `api_version`/`kind` through API discovery
///
/// Only the reference's group is discovered. The returned resource keeps
/// the requested version even when discovery prefers another one, so
/// callers read exactly what the reference names.
pub async fn discover_api_resource(
    client: &Client,
    api_version: &str,
    kind: &str,
) -> Result<ApiResource, Error> {
    let (group, _) = parse_api_version(api_version);

    let discovery = Discovery::new(client.clone())
        .filter(&[group.as_str()])
        .run()
        .await?;

    let discovered: Vec<ApiResource> = discovery
        .groups()
        .filter(|api_group| api_group.name() == group)
        .flat_map(|api_group| api_group.recommended_resources())
        .map(|(ar, _caps)| ar)
        .collect();

    Ok(resolve_api_resource(api_version, kind, &discovered))
}

/// ApiResource for `api_version`/`kind`, taking the plural from a discovered
/// resource of the same kind
///
/// Falls back to [`pluralize_kind`] when the kind was not discovered, e.g.
/// right after its CRD was installed.
pub fn resolve_api_resource(api_version: &str, kind: &str, discovered: &[ApiResource]) -> ApiResource {
    let mut resource = build_api_resource(api_version, kind);
    match discovered.iter().find(|ar| ar.kind == kind) {
        Some(found) => resource.plural = found.plural.clone(),
        None => debug!(
            api_version = %api_version,
            kind = %kind,
            "Resource not found in discovery, using fallback pluralization"
        ),
    }
    resource
}

/// Name of the CustomResourceDefinition serving `resource`
pub fn crd_name(resource: &ApiResource) -> String {
    format!("{}.{}", resource.plural, resource.group)
}

/// Check if a kube error is a 404 from the API server
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Create a kube client from an optional kubeconfig path
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig: {}", e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };

    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);

    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pluralize_kind() {
        assert_eq!(pluralize_kind("Cluster"), "clusters");
        assert_eq!(pluralize_kind("ClusterClass"), "clusterclasses");
        assert_eq!(
            pluralize_kind("KubeadmControlPlaneTemplate"),
            "kubeadmcontrolplanetemplates"
        );
        assert_eq!(pluralize_kind("AWSClusterTemplate"), "awsclustertemplates");
        assert_eq!(pluralize_kind("Policy"), "policies");
        assert_eq!(pluralize_kind("Gateway"), "gateways");
    }

    #[test]
    fn test_parse_api_version_with_group() {
        let (group, version) = parse_api_version("controlplane.cluster.x-k8s.io/v1beta1");
        assert_eq!(group, "controlplane.cluster.x-k8s.io");
        assert_eq!(version, "v1beta1");
    }

    #[test]
    fn test_parse_api_version_core() {
        let (group, version) = parse_api_version("v1");
        assert_eq!(group, "");
        assert_eq!(version, "v1");
    }

    #[test]
    fn test_build_api_resource() {
        let ar = build_api_resource(
            "infrastructure.cluster.x-k8s.io/v1beta1",
            "DockerClusterTemplate",
        );
        assert_eq!(ar.group, "infrastructure.cluster.x-k8s.io");
        assert_eq!(ar.version, "v1beta1");
        assert_eq!(ar.kind, "DockerClusterTemplate");
        assert_eq!(ar.plural, "dockerclustertemplates");
    }

    fn discovered(api_version: &str, kind: &str, plural: &str) -> ApiResource {
        let mut ar = build_api_resource(api_version, kind);
        ar.plural = plural.to_string();
        ar
    }

    /// Story: A provider kind with an irregular plural is only reachable
    /// under the plural its CRD declares, never the English-rules guess.
    #[test]
    fn story_discovered_plural_wins_over_guess() {
        let resources = [
            discovered("infrastructure.example.io/v1beta1", "Chassis", "chassis"),
            discovered("infrastructure.example.io/v1beta1", "ChassisTemplate", "chassistemplates"),
        ];

        let ar = resolve_api_resource("infrastructure.example.io/v1beta1", "Chassis", &resources);

        assert_eq!(ar.plural, "chassis");
        assert_ne!(pluralize_kind("Chassis"), "chassis");
    }

    #[test]
    fn test_resolve_keeps_requested_version() {
        let resources = [discovered(
            "infrastructure.example.io/v1beta2",
            "Chassis",
            "chassis",
        )];

        let ar = resolve_api_resource("infrastructure.example.io/v1beta1", "Chassis", &resources);

        assert_eq!(ar.version, "v1beta1");
        assert_eq!(ar.api_version, "infrastructure.example.io/v1beta1");
        assert_eq!(ar.plural, "chassis");
    }

    #[test]
    fn test_resolve_falls_back_to_pluralization() {
        let ar = resolve_api_resource(
            "infrastructure.cluster.x-k8s.io/v1beta1",
            "DockerClusterTemplate",
            &[],
        );
        assert_eq!(ar.plural, "dockerclustertemplates");
        assert_eq!(ar.group, "infrastructure.cluster.x-k8s.io");
    }

    #[test]
    fn test_crd_name() {
        let ar = discovered(
            "controlplane.cluster.x-k8s.io/v1beta1",
            "KubeadmControlPlaneTemplate",
            "kubeadmcontrolplanetemplates",
        );
        assert_eq!(
            crd_name(&ar),
            "kubeadmcontrolplanetemplates.controlplane.cluster.x-k8s.io"
        );
    }

    #[test]
    fn test_is_not_found() {
        let not_found = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        });
        assert!(is_not_found(&not_found));

        let conflict = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "conflict".to_string(),
            reason: "Conflict".to_string(),
            code: 409,
        });
        assert!(!is_not_found(&conflict));
    }
}
