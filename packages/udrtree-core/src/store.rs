use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;

use crate::error::{Error, Result};
use crate::ids::NodeId;

pub const ROOT_NAME: &str = "root";
pub const TRASH_NAME: &str = "__trash";

/// A node in the arena. `parent` and `children` are ids into the owning [`TreeStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeNode {
    pub id: NodeId,
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: BTreeSet<NodeId>,
}

impl TreeNode {
    fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            parent: None,
            children: BTreeSet::new(),
        }
    }
}

/// `(node, parent, name)` triple used to compare replicas structurally.
pub type NodeExport = (NodeId, Option<NodeId>, String);

/// Arena owning every node a replica has ever seen, plus a flat name index.
///
/// Nodes are never removed from the arena: a removed node simply lives under Trash.
#[derive(Clone, Debug)]
pub struct TreeStore {
    nodes: HashMap<NodeId, TreeNode>,
    // Concurrent adds on different replicas can pick the same name; lookups resolve to the
    // smallest id so every replica answers the same way.
    names: HashMap<String, BTreeSet<NodeId>>,
}

impl Default for TreeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeStore {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(NodeId::ROOT, TreeNode::new(NodeId::ROOT, ROOT_NAME));
        nodes.insert(NodeId::TRASH, TreeNode::new(NodeId::TRASH, TRASH_NAME));
        let mut names = HashMap::new();
        names.insert(ROOT_NAME.to_string(), BTreeSet::from([NodeId::ROOT]));
        Self { nodes, names }
    }

    pub fn exists(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.name.as_str())
    }

    pub fn children(&self, id: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.nodes.get(&id).map(|n| &n.children)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values()
    }

    /// Resolve a name to a node. Trash is not addressable by name, and neither is a detached
    /// node until some operation attaches it.
    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.names
            .get(name)
            .and_then(|ids| ids.iter().copied().find(|id| self.is_attached(*id)))
    }

    /// Root, or any node that currently has a parent.
    pub fn is_attached(&self, id: NodeId) -> bool {
        id == NodeId::ROOT || self.parent(id).is_some()
    }

    /// True if `a` is `b` or one of `b`'s descendants.
    pub fn is_descendant_or_self(&self, a: NodeId, b: NodeId) -> bool {
        let mut current = Some(a);
        while let Some(n) = current {
            if n == b {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// Whether `id` currently sits somewhere below Trash.
    pub fn is_removed(&self, id: NodeId) -> bool {
        id != NodeId::TRASH && self.is_descendant_or_self(id, NodeId::TRASH)
    }

    /// First sighting of a node: create it detached, so the log entry that introduced it can
    /// attach it (and later detach it again on revert).
    pub(crate) fn create_detached(&mut self, id: NodeId, name: &str) {
        if self.nodes.contains_key(&id) {
            return;
        }
        self.nodes.insert(id, TreeNode::new(id, name));
        self.index_name(id, name);
    }

    /// Move `node` under `new_parent`. `NodeId::NONE` detaches it.
    ///
    /// The only structural mutator; callers must already hold the engine lock.
    pub(crate) fn reparent(&mut self, node: NodeId, new_parent: NodeId) -> Result<()> {
        let old_parent = match self.nodes.get(&node) {
            Some(state) => state.parent,
            None => return Err(missing(node)),
        };
        if new_parent != NodeId::NONE && !self.nodes.contains_key(&new_parent) {
            return Err(missing(new_parent));
        }

        if let Some(p) = old_parent.and_then(|p| self.nodes.get_mut(&p)) {
            p.children.remove(&node);
        }
        if let Some(p) = self.nodes.get_mut(&new_parent) {
            p.children.insert(node);
        }
        if let Some(state) = self.nodes.get_mut(&node) {
            state.parent = (new_parent != NodeId::NONE).then_some(new_parent);
        }
        Ok(())
    }

    pub(crate) fn set_name(&mut self, node: NodeId, name: &str) -> Result<()> {
        let state = self.nodes.get_mut(&node).ok_or_else(|| missing(node))?;
        if state.name == name {
            return Ok(());
        }
        let old = std::mem::replace(&mut state.name, name.to_string());
        if let Some(ids) = self.names.get_mut(&old) {
            ids.remove(&node);
            if ids.is_empty() {
                self.names.remove(&old);
            }
        }
        self.index_name(node, name);
        Ok(())
    }

    fn index_name(&mut self, node: NodeId, name: &str) {
        if node == NodeId::TRASH {
            return;
        }
        self.names.entry(name.to_string()).or_default().insert(node);
    }

    /// Every attached node as `(id, parent, name)`, sorted by id.
    ///
    /// Detached nodes are left out: they only exist because an operation named them before
    /// the operation placing them became applicable, and the name they carry meanwhile depends
    /// on arrival order.
    pub fn snapshot(&self) -> Vec<NodeExport> {
        let mut out: Vec<NodeExport> = self
            .nodes
            .values()
            .filter(|n| n.parent.is_some() || n.id == NodeId::ROOT || n.id == NodeId::TRASH)
            .map(|n| (n.id, n.parent, n.name.clone()))
            .collect();
        out.sort_by_key(|(id, _, _)| *id);
        out
    }

    /// Human-readable rendering of the tree reachable from Root, siblings sorted by name.
    pub fn render(&self) -> String {
        let mut out = String::from(ROOT_NAME);
        out.push('\n');
        self.render_children(NodeId::ROOT, "", &mut out);
        out
    }

    fn render_children(&self, node: NodeId, prefix: &str, out: &mut String) {
        let Some(children) = self.children(node) else {
            return;
        };
        let mut sorted: Vec<&TreeNode> = children
            .iter()
            .filter_map(|c| self.nodes.get(c))
            .collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        for (i, child) in sorted.iter().enumerate() {
            let last = i + 1 == sorted.len();
            let (branch, indent) = if last {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            let _ = writeln!(out, "{prefix}{branch}{}", child.name);
            self.render_children(child.id, &format!("{prefix}{indent}"), out);
        }
    }
}

fn missing(node: NodeId) -> Error {
    debug_assert!(false, "node {node} referenced but absent from the store");
    Error::InconsistentState(format!("node {node} not present in store"))
}
