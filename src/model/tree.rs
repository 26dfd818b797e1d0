use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::location::{LocationSet, StorageLocation};
use super::path;
use super::value::NodeValue;

/// Handle to a node inside a [`ModelTree`].
///
/// Handles are generational: once a node is detached (by `remove` or
/// `clear`) its handle goes stale and every accessor treats it as absent,
/// even if the slot is later reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0} is not part of this tree")]
    StaleNode(NodeId),
}

/// Supplies values for `Game` nodes, keyed by model purpose and node name.
pub trait GameLookup: Send + Sync {
    fn lookup(&self, purpose: &str, name: &str) -> Option<NodeValue>;
}

impl<F> GameLookup for F
where
    F: Fn(&str, &str) -> Option<NodeValue> + Send + Sync,
{
    fn lookup(&self, purpose: &str, name: &str) -> Option<NodeValue> {
        self(purpose, name)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) policy: StorageLocation,
    /// Cached resolution of `policy` against the ancestor chain.
    pub(crate) effective: StorageLocation,
    pub(crate) value: Option<NodeValue>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// A model: one root plus its exclusively-owned descendants.
///
/// Nodes live in an arena; children vectors are the only ownership path and
/// parent links are plain handles. The root has an empty name and path, and
/// its policy is always explicit.
pub struct ModelTree {
    purpose: String,
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    lookup: Option<Arc<dyn GameLookup>>,
}

impl fmt::Debug for ModelTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelTree")
            .field("purpose", &self.purpose)
            .field("nodes", &self.len())
            .field("lookup", &self.lookup.is_some())
            .finish()
    }
}

impl ModelTree {
    /// Create an empty model whose root stores values locally.
    pub fn new(purpose: impl Into<String>) -> Self {
        Self::with_root_policy(purpose, StorageLocation::Local)
    }

    pub fn with_root_policy(purpose: impl Into<String>, policy: StorageLocation) -> Self {
        let policy = root_policy(policy);
        let root = Node {
            name: String::new(),
            parent: None,
            children: Vec::new(),
            policy,
            effective: policy,
            value: None,
        };
        Self {
            purpose: purpose.into(),
            slots: vec![Slot {
                generation: 0,
                node: Some(root),
            }],
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            lookup: None,
        }
    }

    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Install (or remove) the collaborator that resolves `Game` values.
    pub fn set_lookup(&mut self, lookup: Option<Arc<dyn GameLookup>>) {
        self.lookup = lookup;
    }

    /// Number of live nodes, excluding the root.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.node.is_some()).count() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.child_count(self.root) == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    // ============================================================
    // Derived properties
    // ============================================================

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|node| node.name.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|node| node.parent)
    }

    /// Children in insertion order. Stale handles have none.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|node| node.children.as_slice()).unwrap_or(&[])
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.children(id).len()
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id == self.root && self.contains(id)
    }

    /// The root this node hangs from, found by walking parent links.
    pub fn root_of(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        self.node(current)?;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        Some(current)
    }

    /// Escaped dotted path from (excluding) the root. The root's path is `""`.
    pub fn path(&self, id: NodeId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = self.node(id)?;
        while let Some(parent) = current.parent {
            names.push(current.name.as_str());
            current = self.node(parent)?;
        }
        names.reverse();
        Some(path::join(names))
    }

    /// Resolve an escaped path from the root, taking the first sibling
    /// match at every level.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        path::split(path)
            .iter()
            .try_fold(self.root, |current, name| self.child(current, name))
    }

    /// First child with the given name.
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&child| self.name(child) == Some(name))
    }

    /// Child by position; `None` when out of range.
    pub fn child_at(&self, parent: NodeId, index: usize) -> Option<NodeId> {
        self.children(parent).get(index).copied()
    }

    // ============================================================
    // Policies
    // ============================================================

    /// The policy set on the node itself, possibly `Inherited`.
    pub fn stored_policy(&self, id: NodeId) -> Option<StorageLocation> {
        self.node(id).map(|node| node.policy)
    }

    /// The policy in force: the nearest explicit policy walking up from the
    /// node. Never `Inherited` for a live node.
    pub fn effective_policy(&self, id: NodeId) -> Option<StorageLocation> {
        self.node(id).map(|node| node.effective)
    }

    /// Change a node's own policy and re-resolve its subtree.
    pub fn set_policy(&mut self, id: NodeId, policy: StorageLocation) -> Result<(), TreeError> {
        let policy = if id == self.root {
            root_policy(policy)
        } else {
            policy
        };
        self.node_mut(id).ok_or(TreeError::StaleNode(id))?.policy = policy;

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let inherited = self
                .parent(current)
                .and_then(|parent| self.effective_policy(parent));
            let Some(node) = self.node_mut(current) else {
                continue;
            };
            node.effective = resolve(node.policy, inherited);
            if !node.effective.stores_value() {
                node.value = None;
            }
            stack.extend(node.children.iter().rev().copied());
        }
        Ok(())
    }

    // ============================================================
    // Values
    // ============================================================

    /// Read a node's value, dispatching on its effective policy.
    ///
    /// `Game` nodes are resolved through the lookup collaborator on every
    /// read; without one they read as absent.
    pub fn value(&self, id: NodeId) -> Option<NodeValue> {
        let node = self.node(id)?;
        match node.effective {
            StorageLocation::Game => self
                .lookup
                .as_ref()
                .and_then(|lookup| lookup.lookup(&self.purpose, &node.name)),
            _ => node.value.clone(),
        }
    }

    /// Borrow the stored value without going through the lookup.
    pub fn stored_value(&self, id: NodeId) -> Option<&NodeValue> {
        self.node(id).and_then(|node| node.value.as_ref())
    }

    /// Write a node's value. Returns `false` when nothing was stored:
    /// the handle is stale or the node's effective policy is `Game`.
    pub fn set_value(&mut self, id: NodeId, value: Option<NodeValue>) -> bool {
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        if !node.effective.stores_value() {
            tracing::debug!(name = %node.name, "ignoring write to game-backed node");
            return false;
        }
        node.value = value;
        true
    }

    // ============================================================
    // Structure
    // ============================================================

    /// Append a child with no value.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        policy: StorageLocation,
    ) -> Result<NodeId, TreeError> {
        self.insert(parent, name.into(), None, policy)
    }

    /// Append a child holding `value`. A value given to a `Game` node is
    /// dropped, exactly as a later `set_value` would be.
    pub fn add_child_value(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        value: impl Into<NodeValue>,
        policy: StorageLocation,
    ) -> Result<NodeId, TreeError> {
        self.insert(parent, name.into(), Some(value.into()), policy)
    }

    fn insert(
        &mut self,
        parent: NodeId,
        name: String,
        value: Option<NodeValue>,
        policy: StorageLocation,
    ) -> Result<NodeId, TreeError> {
        let inherited = self
            .effective_policy(parent)
            .ok_or(TreeError::StaleNode(parent))?;
        let effective = resolve(policy, Some(inherited));
        let value = value.filter(|_| effective.stores_value());

        let id = self.alloc(Node {
            name,
            parent: Some(parent),
            children: Vec::new(),
            policy,
            effective,
            value,
        });
        if let Some(node) = self.node_mut(parent) {
            node.children.push(id);
        }
        Ok(id)
    }

    /// Detach an immediate child and drop its subtree.
    ///
    /// Returns `false` when `child` is stale or not a direct child of
    /// `parent`.
    pub fn remove(&mut self, parent: NodeId, child: NodeId) -> bool {
        if !self.contains(child) {
            return false;
        }
        let Some(node) = self.node_mut(parent) else {
            return false;
        };
        let Some(position) = node.children.iter().position(|&c| c == child) else {
            return false;
        };
        node.children.remove(position);
        for id in self.subtree_postorder(child) {
            self.release(id);
        }
        true
    }

    /// Drop every descendant, deepest first, then empty the node's own
    /// children last.
    pub fn clear(&mut self, id: NodeId) {
        if !self.contains(id) {
            return;
        }
        let descendants: Vec<NodeId> = self
            .children(id)
            .to_vec()
            .into_iter()
            .flat_map(|child| self.subtree_postorder(child))
            .collect();
        for descendant in descendants {
            self.release(descendant);
        }
        if let Some(node) = self.node_mut(id) {
            node.children.clear();
        }
    }

    /// Null the stored value of every node the post-order walk yields under
    /// `filter`, leaving structure intact.
    pub fn clear_data(&mut self, id: NodeId, filter: LocationSet) {
        let targets: Vec<NodeId> = self.postfix(id, filter).collect();
        for target in targets {
            if let Some(node) = self.node_mut(target) {
                node.value = None;
            }
        }
    }

    /// The node and all its descendants, children before parents.
    fn subtree_postorder(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                order.push(current);
                continue;
            }
            stack.push((current, true));
            stack.extend(self.children(current).iter().rev().map(|&c| (c, false)));
        }
        order
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        if id == self.root {
            return;
        }
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            return;
        };
        if slot.generation != id.generation || slot.node.is_none() {
            return;
        }
        if let Some(node) = slot.node.as_mut() {
            node.children.clear();
        }
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
    }
}

fn resolve(policy: StorageLocation, inherited: Option<StorageLocation>) -> StorageLocation {
    match policy {
        StorageLocation::Inherited => inherited.unwrap_or(StorageLocation::Local),
        explicit => explicit,
    }
}

fn root_policy(policy: StorageLocation) -> StorageLocation {
    match policy {
        StorageLocation::Inherited => StorageLocation::Local,
        explicit => explicit,
    }
}
