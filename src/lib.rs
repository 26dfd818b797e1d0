//! Typed, policy-annotated model trees.
//!
//! A [`model::ModelTree`] holds named values in a hierarchy where every node
//! carries a storage policy. Trees are persisted in two halves (structure
//! and data) through the [`codec`] formats, to a [`store`] or to a remote
//! service via [`remote`]. [`registry::ModelRegistry`] ties these together
//! per model purpose.

pub mod api;
pub mod codec;
pub mod config;
pub mod model;
pub mod registry;
pub mod remote;
pub mod store;

pub use codec::{DataReport, Format, TypeRegistry};
pub use model::{LocationSet, ModelTree, NodeId, NodeValue, StorageLocation};
pub use registry::{Endpoint, ModelRegistry, RegistryError};
