//! The model tree.
//!
//! # Core Concepts
//!
//! - [`ModelTree`]: one model ("purpose"), a root plus its exclusively-owned
//!   descendants. Nodes are addressed by [`NodeId`] handles.
//! - [`StorageLocation`]: a node's storage policy. `Inherited` nodes take the
//!   policy of their nearest explicit ancestor; the resolved value is the
//!   node's *effective* policy.
//! - [`NodeValue`]: a node's payload, a scalar or a [`Composite`]. `Game`
//!   nodes hold no value and resolve reads through a [`GameLookup`].
//! - Paths: the escaped, dotted join of names below the root (see [`path`]).
//!   Paths are the join key between a tree and its serialized forms.
//! - Walks: [`ModelTree::prefix`] and [`ModelTree::postfix`], filtered by a
//!   [`LocationSet`].

mod location;
pub mod path;
mod render;
mod traverse;
mod tree;
mod value;

pub use location::*;
pub use render::render_tree;
pub use traverse::*;
pub use tree::*;
pub use value::*;
