//! Error types for topology computation
//!
//! Every failure carries the kind/name/namespace of the object involved so a
//! single log line is enough to find the broken reference or template.

use thiserror::Error;

use lattice_common::crd::ObjectReference;

/// Errors raised while loading a ClusterClass or computing a desired state
#[derive(Debug, Error)]
pub enum TopologyError {
    /// The Cluster has no `spec.topology`
    #[error("cluster {cluster} does not define a managed topology")]
    TopologyNotDefined {
        /// Cluster name
        cluster: String,
    },

    /// The ClusterClass named by the topology does not exist
    #[error("ClusterClass {name:?} not found in namespace {namespace:?}")]
    ClassNotFound {
        /// ClusterClass name
        name: String,
        /// Namespace that was searched
        namespace: String,
    },

    /// A ClusterClass field that must hold a template reference is empty
    #[error("{field}: reference is not set")]
    ReferenceNotSet {
        /// Field path of the missing reference
        field: String,
    },

    /// Reading an object from the API server failed, or it does not exist
    #[error("failed to retrieve {kind} {name:?} in namespace {namespace:?}: {reason}")]
    Fetch {
        /// Kind of the object
        kind: String,
        /// Object name
        name: String,
        /// Object namespace
        namespace: String,
        /// What went wrong
        reason: String,
        /// Underlying client error, absent when the object was not found
        #[source]
        source: Option<lattice_common::Error>,
    },

    /// A nested reference is missing one of its fields
    #[error("failed to get {field} from {kind}")]
    IncompleteReference {
        /// Full path of the missing field (e.g. "spec.machineTemplate.infrastructureRef.name")
        field: String,
        /// Kind of the object that was read
        kind: String,
    },

    /// Writing a nested field failed
    #[error("failed to set {path} in {kind}: {reason}")]
    NestedFieldWrite {
        /// Path that was written
        path: String,
        /// Kind of the object being written
        kind: String,
        /// Why the write failed
        reason: String,
    },

    /// A template object does not have the expected shape
    #[error("invalid template {kind} {name:?}: {message}")]
    InvalidTemplate {
        /// Template kind
        kind: String,
        /// Template name
        name: String,
        /// Description of the problem
        message: String,
    },

    /// Resolving a reference to the current API contract failed
    #[error("failed to update {kind} {name:?} to the current contract: {source}")]
    ContractNormalization {
        /// Kind of the referenced object
        kind: String,
        /// Name of the referenced object
        name: String,
        /// Underlying error
        #[source]
        source: lattice_common::Error,
    },

    /// Persisting corrected references back to the ClusterClass failed
    #[error("failed to patch ClusterClass {name:?} in namespace {namespace:?}: {source}")]
    ClassPatch {
        /// ClusterClass name
        name: String,
        /// ClusterClass namespace
        namespace: String,
        /// Underlying client error
        #[source]
        source: lattice_common::Error,
    },

    /// Computing one component of the desired state failed
    #[error("failed to generate the {component} object from the {kind}: {source}")]
    Compute {
        /// Component being computed (e.g. "ControlPlane")
        component: &'static str,
        /// Kind of the template it was computed from
        kind: String,
        /// Underlying error
        #[source]
        source: Box<TopologyError>,
    },

    /// Several independent failures
    #[error("[{}]", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    Aggregate(Vec<TopologyError>),
}

impl TopologyError {
    /// Fetch failure for an object that does not exist
    pub fn not_found(reference: &ObjectReference) -> Self {
        Self::Fetch {
            kind: reference.kind.clone(),
            name: reference.name.clone(),
            namespace: reference.namespace.clone(),
            reason: "not found".to_string(),
            source: None,
        }
    }

    /// Fetch failure caused by a client error
    pub fn fetch(reference: &ObjectReference, source: lattice_common::Error) -> Self {
        Self::Fetch {
            kind: reference.kind.clone(),
            name: reference.name.clone(),
            namespace: reference.namespace.clone(),
            reason: source.to_string(),
            source: Some(source),
        }
    }

    /// Collapse a list of errors into one, flattening nested aggregates
    ///
    /// A single error is returned as-is rather than wrapped.
    pub fn aggregate(errors: impl IntoIterator<Item = TopologyError>) -> Self {
        let mut flat = Vec::new();
        for err in errors {
            match err {
                TopologyError::Aggregate(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            if let Some(only) = flat.pop() {
                return only;
            }
        }
        TopologyError::Aggregate(flat)
    }

    /// Combine a computation result with the result of a follow-up step
    /// that must run regardless (e.g. persisting corrections).
    ///
    /// Both failures are kept when both steps failed.
    pub fn combine<T>(
        primary: Result<T, TopologyError>,
        secondary: Result<(), TopologyError>,
    ) -> Result<T, TopologyError> {
        match (primary, secondary) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) | (Err(err), Ok(())) => Err(err),
            (Err(first), Err(second)) => Err(Self::aggregate([first, second])),
        }
    }

    /// Individual errors: the members of an aggregate, or this error alone
    pub fn errors(&self) -> &[TopologyError] {
        match self {
            TopologyError::Aggregate(errors) => errors.as_slice(),
            other => std::slice::from_ref(other),
        }
    }

    /// Wrap an error with the component being computed and its template kind
    pub fn in_component(self, component: &'static str, kind: impl Into<String>) -> Self {
        Self::Compute {
            component,
            kind: kind.into(),
            source: Box::new(self),
        }
    }

    /// Check if retrying without a change to the ClusterClass or its
    /// templates can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TopologyError::TopologyNotDefined { .. }
            | TopologyError::ClassNotFound { .. }
            | TopologyError::ReferenceNotSet { .. }
            | TopologyError::IncompleteReference { .. }
            | TopologyError::NestedFieldWrite { .. }
            | TopologyError::InvalidTemplate { .. } => false,
            TopologyError::Fetch { source, .. } => {
                source.as_ref().is_some_and(lattice_common::Error::is_retryable)
            }
            TopologyError::ContractNormalization { source, .. }
            | TopologyError::ClassPatch { source, .. } => source.is_retryable(),
            TopologyError::Compute { source, .. } => source.is_retryable(),
            TopologyError::Aggregate(errors) => errors.iter().any(TopologyError::is_retryable),
        }
    }
}
