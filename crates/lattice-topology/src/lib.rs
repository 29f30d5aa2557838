//! Desired-state compiler for Cluster API managed topologies
//!
//! Given a Cluster whose `spec.topology` names a ClusterClass, this crate
//! loads the class and the provider templates it references, reads the
//! objects the Cluster currently points at, and computes the objects that
//! should exist:
//!
//! - [`class`] loads a ClusterClass and its templates, normalizing template
//!   references to the current API contract
//! - [`current`] reads the objects a Cluster currently references
//! - [`compiler`] turns class plus current state into a [`DesiredState`]
//! - [`template`] and [`generate`] instantiate objects from templates
//! - [`reference`] reads and writes references nested in untyped objects
//! - [`labels`] merges label and annotation maps
//! - [`controller`] runs the computation for every managed Cluster

#![deny(missing_docs)]

pub mod class;
pub mod compiler;
pub mod config;
pub mod constants;
pub mod contract;
pub mod controller;
pub mod current;
pub mod error;
pub mod generate;
pub mod labels;
pub mod names;
pub mod reference;
pub mod state;
pub mod store;
pub mod template;

pub use class::ClassLoader;
pub use compiler::TopologyCompiler;
pub use config::TopologyConfig;
pub use error::TopologyError;
pub use state::{DesiredState, TopologyClass, TopologyState};
pub use template::TemplateInstantiator;
