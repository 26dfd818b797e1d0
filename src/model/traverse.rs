//! Pre-order and post-order walks over a subtree.
//!
//! Both walks visit the whole subtree and apply the location filter to each
//! node on its own; a node filtered out never hides its descendants. When a
//! walk starts at the root, the root itself is not yielded.

use super::location::LocationSet;
use super::tree::{ModelTree, NodeId};

/// Parents before children.
#[derive(Debug, Clone)]
pub struct Prefix<'a> {
    tree: &'a ModelTree,
    filter: LocationSet,
    stack: Vec<NodeId>,
}

/// Children before parents.
#[derive(Debug, Clone)]
pub struct Postfix<'a> {
    tree: &'a ModelTree,
    filter: LocationSet,
    stack: Vec<(NodeId, bool)>,
}

impl ModelTree {
    /// Walk `start`'s subtree in pre-order, yielding nodes whose effective
    /// policy passes `filter`.
    pub fn prefix(&self, start: NodeId, filter: LocationSet) -> Prefix<'_> {
        Prefix {
            tree: self,
            filter,
            stack: self.walk_roots(start).into_iter().rev().collect(),
        }
    }

    /// Walk `start`'s subtree in post-order, yielding nodes whose effective
    /// policy passes `filter`.
    pub fn postfix(&self, start: NodeId, filter: LocationSet) -> Postfix<'_> {
        Postfix {
            tree: self,
            filter,
            stack: self
                .walk_roots(start)
                .into_iter()
                .rev()
                .map(|id| (id, false))
                .collect(),
        }
    }

    /// The first nodes a walk from `start` expands: the root's children, or
    /// the start node itself.
    fn walk_roots(&self, start: NodeId) -> Vec<NodeId> {
        if self.is_root(start) {
            self.children(start).to_vec()
        } else if self.contains(start) {
            vec![start]
        } else {
            Vec::new()
        }
    }

    fn passes(&self, id: NodeId, filter: LocationSet) -> bool {
        self.effective_policy(id)
            .is_some_and(|location| filter.matches(location))
    }
}

impl Iterator for Prefix<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        while let Some(id) = self.stack.pop() {
            self.stack
                .extend(self.tree.children(id).iter().rev().copied());
            if self.tree.passes(id, self.filter) {
                return Some(id);
            }
        }
        None
    }
}

impl Iterator for Postfix<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        while let Some((id, expanded)) = self.stack.pop() {
            if expanded {
                if self.tree.passes(id, self.filter) {
                    return Some(id);
                }
                continue;
            }
            self.stack.push((id, true));
            self.stack
                .extend(self.tree.children(id).iter().rev().map(|&c| (c, false)));
        }
        None
    }
}
