//! Object references embedded in untyped documents
//!
//! Provider objects (control planes, infrastructure clusters) are handled as
//! `DynamicObject`, so references between them live at nested paths inside
//! `data`. [`FieldPath`] gives typed access to those paths: reads return
//! `Option` for a missing value and writes return an explicit error when an
//! intermediate segment is not a map.

use std::fmt;

use kube::api::DynamicObject;
use serde_json::{Map, Value};
use thiserror::Error;

use lattice_common::crd::ObjectReference;

use crate::error::TopologyError;

/// Failure writing a [`FieldPath`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldPathError {
    /// The path has no segments
    #[error("field path is empty")]
    Empty,
    /// An existing value along the path is not a map
    #[error("value at {path:?} is not a map")]
    NotAMap {
        /// Prefix of the path holding the offending value
        path: String,
    },
}

/// Dot-separated path into an object's body
///
/// Paths are relative to `DynamicObject::data`, which holds everything but
/// `apiVersion`, `kind`, and `metadata`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldPath<'a> {
    segments: &'a [&'a str],
}

impl<'a> FieldPath<'a> {
    /// Path made of the given segments
    pub const fn new(segments: &'a [&'a str]) -> Self {
        Self { segments }
    }

    /// Segments of this path
    pub fn segments(&self) -> &'a [&'a str] {
        self.segments
    }

    /// Value at this path, if every segment exists
    pub fn get<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.segments
            .iter()
            .try_fold(root, |value, segment| value.get(*segment))
    }

    /// String at this path; `None` if missing or not a string
    pub fn get_str<'v>(&self, root: &'v Value) -> Option<&'v str> {
        self.get(root).and_then(Value::as_str)
    }

    /// Whether a value exists at this path
    pub fn contains(&self, root: &Value) -> bool {
        self.get(root).is_some()
    }

    /// Write `value` at this path, creating missing intermediate maps
    ///
    /// A null root is replaced by an empty map. Along the path, an existing
    /// intermediate value that is not a map aborts the write; this includes an
    /// intermediate null. Maps created before the failing segment are kept.
    pub fn set(&self, root: &mut Value, value: Value) -> Result<(), FieldPathError> {
        let (last, parents) = self.segments.split_last().ok_or(FieldPathError::Empty)?;

        if root.is_null() {
            *root = Value::Object(Map::new());
        }
        let mut current = root.as_object_mut().ok_or_else(|| FieldPathError::NotAMap {
            path: String::new(),
        })?;

        for (depth, segment) in parents.iter().enumerate() {
            let entry = current
                .entry(*segment)
                .or_insert_with(|| Value::Object(Map::new()));
            current = entry
                .as_object_mut()
                .ok_or_else(|| FieldPathError::NotAMap {
                    path: self.segments[..=depth].join("."),
                })?;
        }

        current.insert((*last).to_string(), value);
        Ok(())
    }
}

impl fmt::Display for FieldPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Kind of a dynamic object, empty if it has no type information
pub fn object_kind(obj: &DynamicObject) -> String {
    obj.types
        .as_ref()
        .map(|t| t.kind.clone())
        .unwrap_or_default()
}

/// apiVersion of a dynamic object, empty if it has no type information
pub fn object_api_version(obj: &DynamicObject) -> String {
    obj.types
        .as_ref()
        .map(|t| t.api_version.clone())
        .unwrap_or_default()
}

/// Read the reference stored at `path` in `obj`
///
/// Fields are read in the order apiVersion, kind, name, namespace; the first
/// one that is missing or not a string fails the read.
pub fn get_nested_ref(
    obj: &DynamicObject,
    path: &FieldPath<'_>,
) -> Result<ObjectReference, TopologyError> {
    let read = |field: &str| -> Result<String, TopologyError> {
        let segments: Vec<&str> = path
            .segments()
            .iter()
            .copied()
            .chain(std::iter::once(field))
            .collect();
        FieldPath::new(&segments)
            .get_str(&obj.data)
            .map(str::to_string)
            .ok_or_else(|| TopologyError::IncompleteReference {
                field: format!("{}.{}", path, field),
                kind: object_kind(obj),
            })
    };

    let api_version = read("apiVersion")?;
    let kind = read("kind")?;
    let name = read("name")?;
    let namespace = read("namespace")?;

    Ok(ObjectReference {
        api_version,
        kind,
        namespace,
        name,
    })
}

/// Store a reference to `target` at `path` in `obj`
pub fn set_nested_ref(
    obj: &mut DynamicObject,
    target: &DynamicObject,
    path: &FieldPath<'_>,
) -> Result<(), TopologyError> {
    let reference = to_reference(target);
    let value = serde_json::json!({
        "kind": reference.kind,
        "namespace": reference.namespace,
        "name": reference.name,
        "apiVersion": reference.api_version,
    });

    set_nested_field(obj, path, value)
}

/// Write `value` at `path` in `obj`
pub fn set_nested_field(
    obj: &mut DynamicObject,
    path: &FieldPath<'_>,
    value: Value,
) -> Result<(), TopologyError> {
    let kind = object_kind(obj);
    path.set(&mut obj.data, value)
        .map_err(|e| TopologyError::NestedFieldWrite {
            path: path.to_string(),
            kind,
            reason: e.to_string(),
        })
}

/// Reference to a dynamic object; missing fields become empty strings
pub fn to_reference(obj: &DynamicObject) -> ObjectReference {
    ObjectReference {
        api_version: object_api_version(obj),
        kind: object_kind(obj),
        namespace: obj.metadata.namespace.clone().unwrap_or_default(),
        name: obj.metadata.name.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CONTROL_PLANE_INFRASTRUCTURE_REF_PATH;
    use serde_json::json;

    const INFRA_REF: FieldPath<'static> = FieldPath::new(CONTROL_PLANE_INFRASTRUCTURE_REF_PATH);

    fn dynamic(api_version: &str, kind: &str, namespace: &str, name: &str, data: Value) -> DynamicObject {
        let mut value = json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": { "name": name, "namespace": namespace },
        });
        if let (Some(target), Value::Object(fields)) = (value.as_object_mut(), data) {
            target.extend(fields);
        }
        serde_json::from_value(value).expect("dynamic object should deserialize")
    }

    fn machine_template() -> DynamicObject {
        dynamic(
            "infrastructure.cluster.x-k8s.io/v1beta1",
            "DockerMachineTemplate",
            "ns",
            "c1-controlplane-abcde",
            json!({ "spec": { "template": { "spec": {} } } }),
        )
    }

    fn control_plane(data: Value) -> DynamicObject {
        dynamic(
            "controlplane.cluster.x-k8s.io/v1beta1",
            "KubeadmControlPlane",
            "ns",
            "c1-xyz12",
            data,
        )
    }

    #[test]
    fn test_field_path_display() {
        assert_eq!(INFRA_REF.to_string(), "spec.machineTemplate.infrastructureRef");
    }

    #[test]
    fn test_get_distinguishes_missing_from_wrong_type() {
        let root = json!({ "spec": { "replicas": 3, "version": "v1.31.0" } });

        let version = FieldPath::new(&["spec", "version"]);
        let replicas = FieldPath::new(&["spec", "replicas"]);
        let missing = FieldPath::new(&["spec", "paused"]);

        assert_eq!(version.get_str(&root), Some("v1.31.0"));
        assert_eq!(replicas.get(&root), Some(&json!(3)));
        assert_eq!(replicas.get_str(&root), None);
        assert!(replicas.contains(&root));
        assert!(!missing.contains(&root));
    }

    #[test]
    fn test_set_creates_intermediate_maps() {
        let mut root = Value::Null;
        FieldPath::new(&["spec", "machineTemplate", "infrastructureRef"])
            .set(&mut root, json!({ "name": "x" }))
            .expect("set should succeed");
        assert_eq!(root["spec"]["machineTemplate"]["infrastructureRef"]["name"], "x");
    }

    #[test]
    fn test_set_keeps_sibling_fields() {
        let mut root = json!({ "spec": { "version": "v1.30.0", "replicas": 1 } });
        FieldPath::new(&["spec", "version"])
            .set(&mut root, json!("v1.31.0"))
            .expect("set should succeed");
        assert_eq!(root, json!({ "spec": { "version": "v1.31.0", "replicas": 1 } }));
    }

    #[test]
    fn test_set_rejects_non_map_intermediate() {
        let mut root = json!({ "spec": { "machineTemplate": "oops" } });
        let err = INFRA_REF.set(&mut root, json!({})).unwrap_err();
        assert_eq!(
            err,
            FieldPathError::NotAMap {
                path: "spec.machineTemplate".to_string()
            }
        );
        assert_eq!(root["spec"]["machineTemplate"], "oops");
    }

    #[test]
    fn test_set_rejects_null_intermediate_but_not_null_root() {
        let mut root = json!({ "spec": { "machineTemplate": null } });
        let err = INFRA_REF.set(&mut root, json!({})).unwrap_err();
        assert_eq!(
            err,
            FieldPathError::NotAMap {
                path: "spec.machineTemplate".to_string()
            }
        );
        assert!(root["spec"]["machineTemplate"].is_null());

        let mut root = Value::Null;
        INFRA_REF
            .set(&mut root, json!({ "name": "x" }))
            .expect("null root should become a map");
        assert_eq!(root["spec"]["machineTemplate"]["infrastructureRef"]["name"], "x");
    }

    #[test]
    fn test_set_empty_path() {
        let mut root = json!({});
        assert_eq!(
            FieldPath::new(&[]).set(&mut root, json!(1)),
            Err(FieldPathError::Empty)
        );
    }

    /// Story: The reference the compiler writes into a control plane is read
    /// back unchanged on the next reconcile.
    #[test]
    fn story_nested_ref_round_trip() {
        let template = machine_template();
        let mut cp = control_plane(json!({ "spec": { "version": "v1.31.0" } }));

        set_nested_ref(&mut cp, &template, &INFRA_REF).expect("set should succeed");
        let read = get_nested_ref(&cp, &INFRA_REF).expect("get should succeed");

        assert_eq!(read, to_reference(&template));
        assert_eq!(cp.data["spec"]["version"], "v1.31.0");
    }

    #[test]
    fn test_set_nested_ref_reports_path_and_kind() {
        let template = machine_template();
        let mut cp = control_plane(json!({ "spec": { "machineTemplate": [] } }));

        match set_nested_ref(&mut cp, &template, &INFRA_REF) {
            Err(TopologyError::NestedFieldWrite { path, kind, .. }) => {
                assert_eq!(path, "spec.machineTemplate.infrastructureRef");
                assert_eq!(kind, "KubeadmControlPlane");
            }
            other => panic!("Expected NestedFieldWrite, got {:?}", other),
        }
    }

    #[rstest::rstest]
    #[case::no_ref(json!({ "spec": {} }), "apiVersion")]
    #[case::missing_kind(
        json!({ "spec": { "machineTemplate": { "infrastructureRef": {
            "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta1", "name": "a", "namespace": "ns"
        } } } }),
        "kind"
    )]
    #[case::missing_namespace(
        json!({ "spec": { "machineTemplate": { "infrastructureRef": {
            "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta1", "kind": "DockerMachineTemplate", "name": "a"
        } } } }),
        "namespace"
    )]
    #[case::name_not_string(
        json!({ "spec": { "machineTemplate": { "infrastructureRef": {
            "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta1", "kind": "DockerMachineTemplate", "name": 7, "namespace": "ns"
        } } } }),
        "name"
    )]
    fn test_get_nested_ref_reports_first_missing_field(#[case] data: Value, #[case] field: &str) {
        let cp = control_plane(data);
        match get_nested_ref(&cp, &INFRA_REF) {
            Err(TopologyError::IncompleteReference { field: got, kind }) => {
                assert_eq!(got, format!("spec.machineTemplate.infrastructureRef.{}", field));
                assert_eq!(kind, "KubeadmControlPlane");
            }
            other => panic!("Expected IncompleteReference, got {:?}", other),
        }
    }

    #[test]
    fn test_to_reference_of_bare_object_is_empty() {
        let obj = DynamicObject {
            types: None,
            metadata: Default::default(),
            data: Value::Null,
        };
        assert_eq!(to_reference(&obj), ObjectReference::default());
    }
}
