//! Clone-and-stamp of provider templates
//!
//! A provider template (e.g. `DockerClusterTemplate`) carries the body of the
//! object it produces under `spec.template`. Generating an object lifts that
//! body out, strips server-populated metadata, and stamps it with the
//! caller's name plus the cluster and provenance metadata.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kube::core::TypeMeta;
use serde_json::Value;

use lattice_common::crd::ObjectReference;

use crate::constants::{
    CLUSTER_NAME_LABEL, TEMPLATE_BODY_PATH, TEMPLATE_CLONED_FROM_GROUP_KIND_ANNOTATION,
    TEMPLATE_CLONED_FROM_NAME_ANNOTATION, TEMPLATE_KIND_SUFFIX,
};
use crate::error::TopologyError;
use crate::reference::{object_api_version, object_kind, FieldPath};

/// Input for [`generate_template`]
pub struct GenerateTemplateInput<'a> {
    /// Template to generate the object from
    pub template: &'a DynamicObject,
    /// Reference the template was loaded through, recorded as provenance
    pub template_ref: &'a ObjectReference,
    /// Namespace of the generated object
    pub namespace: &'a str,
    /// Name of the owning Cluster
    pub cluster_name: &'a str,
    /// Labels to add on top of the template's own
    pub labels: &'a BTreeMap<String, String>,
    /// Annotations to add on top of the template's own
    pub annotations: &'a BTreeMap<String, String>,
    /// Name of the generated object
    pub name: String,
}

/// Generate a new object from the body of a template
pub fn generate_template(input: GenerateTemplateInput<'_>) -> Result<DynamicObject, TopologyError> {
    let template_kind = object_kind(input.template);
    let template_name = input.template.metadata.name.clone().unwrap_or_default();
    let invalid = |message: String| TopologyError::InvalidTemplate {
        kind: template_kind.clone(),
        name: template_name.clone(),
        message,
    };

    let body = FieldPath::new(TEMPLATE_BODY_PATH)
        .get(&input.template.data)
        .ok_or_else(|| invalid("missing spec.template".to_string()))?;
    let mut fields = match body {
        Value::Object(fields) => fields.clone(),
        _ => return Err(invalid("spec.template is not a map".to_string())),
    };

    let mut metadata: ObjectMeta = match fields.remove("metadata") {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| invalid(format!("invalid spec.template.metadata: {}", e)))?,
        None => ObjectMeta::default(),
    };
    let api_version = take_string(&mut fields, "apiVersion")
        .unwrap_or_else(|| object_api_version(input.template));
    let kind = take_string(&mut fields, "kind").unwrap_or_else(|| {
        template_kind
            .strip_suffix(TEMPLATE_KIND_SUFFIX)
            .unwrap_or(&template_kind)
            .to_string()
    });

    metadata.resource_version = None;
    metadata.finalizers = None;
    metadata.uid = None;
    metadata.self_link = None;
    metadata.name = Some(input.name);
    metadata.namespace = Some(input.namespace.to_string());

    let annotations = metadata.annotations.get_or_insert_with(BTreeMap::new);
    annotations.extend(input.annotations.clone());
    annotations.insert(
        TEMPLATE_CLONED_FROM_NAME_ANNOTATION.to_string(),
        input.template_ref.name.clone(),
    );
    annotations.insert(
        TEMPLATE_CLONED_FROM_GROUP_KIND_ANNOTATION.to_string(),
        input.template_ref.group_kind(),
    );

    let labels = metadata.labels.get_or_insert_with(BTreeMap::new);
    labels.extend(input.labels.clone());
    labels.insert(
        CLUSTER_NAME_LABEL.to_string(),
        input.cluster_name.to_string(),
    );

    Ok(DynamicObject {
        types: Some(TypeMeta { api_version, kind }),
        metadata,
        data: Value::Object(fields),
    })
}

/// Remove a non-empty string field from a map
fn take_string(fields: &mut serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}
