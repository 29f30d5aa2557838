//! Common types for Lattice: Cluster API resources, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;

/// Field manager name used for every write issued by Lattice controllers
pub const LATTICE_FIELD_MANAGER: &str = "lattice-controller";
