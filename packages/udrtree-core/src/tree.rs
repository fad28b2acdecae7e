use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::frontier::TimestampVector;
use crate::ids::{Lamport, NodeId, ReplicaId};
use crate::log::{LogEntry, OperationLog};
use crate::ops::MoveOperation;
use crate::store::{NodeExport, TreeStore};
use crate::traits::{Clock, Outbox};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Whether `remove` accepts a node that is already under Trash.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RemovePolicy {
    #[default]
    Strict,
    /// Allow re-removing; load generators rely on it.
    Relaxed,
}

/// Effect of a single [`TreeCrdt::apply`] on the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApplyDelta {
    /// Final sorted position of the new entry.
    pub index: usize,
    /// How many later entries had to be undone to make room for it.
    pub reverted: usize,
    /// Whether the new entry was suppressed (missing parent or cycle).
    pub ignored: bool,
}

/// Running counters for one replica.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ApplyStats {
    pub local_ops: u64,
    pub remote_ops: u64,
    pub reverted: u64,
    pub compacted: u64,
}

/// Move-operation tree CRDT for one replica.
///
/// Owns the node arena, the operation log, the clock and the compaction frontier, and is
/// their only mutator. Local and remote operations share [`TreeCrdt::apply`].
pub struct TreeCrdt<C, O>
where
    C: Clock,
    O: Outbox,
{
    replica_id: ReplicaId,
    clock: C,
    outbox: O,
    store: TreeStore,
    log: OperationLog, // ordered by (timestamp, replica)
    timestamps: TimestampVector,
    remove_policy: RemovePolicy,
    stats: ApplyStats,
}

impl<C, O> TreeCrdt<C, O>
where
    C: Clock,
    O: Outbox,
{
    /// Replica that does not know its peers yet. Compaction stays off until
    /// [`TreeCrdt::with_replicas`] declares the set.
    pub fn new(replica_id: ReplicaId, clock: C, outbox: O) -> Self {
        Self {
            replica_id,
            clock,
            outbox,
            store: TreeStore::new(),
            log: OperationLog::new(),
            timestamps: TimestampVector::new(),
            remove_policy: RemovePolicy::default(),
            stats: ApplyStats::default(),
        }
    }

    /// Declare the full replica set. Compaction only advances once every member has been
    /// heard from.
    pub fn with_replicas(mut self, replicas: impl IntoIterator<Item = ReplicaId>) -> Self {
        let own = self.replica_id;
        let mut declared = TimestampVector::with_replicas(replicas.into_iter().chain([own]));
        declared.merge(&self.timestamps);
        self.timestamps = declared;
        self
    }

    pub fn with_remove_policy(mut self, policy: RemovePolicy) -> Self {
        self.remove_policy = policy;
        self
    }

    /// Apply a local or remote operation.
    ///
    /// The new entry is appended and bubbled back to its sorted slot, undoing every entry it
    /// passes; then everything from that slot onwards is redone. The result is the tree that
    /// in-order delivery would have produced.
    pub fn apply(&mut self, op: MoveOperation) -> Result<ApplyDelta> {
        if op.node.is_reserved() {
            return Err(Error::InvalidOperation(format!(
                "operation targets reserved node {}",
                op.node
            )));
        }
        self.store.create_detached(op.node, &op.new_name);

        // undo suffix
        let mut index = self.log.push(LogEntry::from_op(&op));
        let mut reverted = 0;
        while index > 0 {
            let entries = self.log.entries();
            if !entries[index].sorts_before(&entries[index - 1]) {
                break;
            }
            self.log.swap_with_previous(index);
            Self::revert(&mut self.store, &self.log.entries()[index])?;
            index -= 1;
            reverted += 1;
        }

        // apply new op, redo suffix
        for i in index..self.log.len() {
            let entry = self.log.get_mut(i).ok_or_else(|| {
                Error::InconsistentState(format!("log slot {i} vanished during replay"))
            })?;
            Self::reapply(&mut self.store, entry)?;
        }
        let ignored = self.log.get(index).map(|e| e.ignored).unwrap_or(true);

        self.timestamps.observe(op.replica, op.timestamp);
        self.clock.observe(op.timestamp);
        self.stats.reverted += reverted as u64;
        if op.replica == self.replica_id {
            self.stats.local_ops += 1;
            self.outbox.publish(&op)?;
        } else {
            self.stats.remote_ops += 1;
        }

        Ok(ApplyDelta {
            index,
            reverted,
            ignored,
        })
    }

    /// Create `name` under `parent` with a fresh node id.
    pub fn add(&mut self, name: &str, parent: &str) -> Result<MoveOperation> {
        self.add_with_id(NodeId::random(), name, parent)
    }

    /// Create `name` under `parent` using a caller-chosen node id.
    pub fn add_with_id(&mut self, node: NodeId, name: &str, parent: &str) -> Result<MoveOperation> {
        validate_name(name)?;
        if self.store.lookup(name).is_some() {
            return Err(Error::NameExists(name.to_string()));
        }
        let parent_id = self.resolve_parent(parent)?;
        if node.is_reserved() || self.store.exists(node) {
            return Err(Error::InvalidOperation(format!("node id {node} already in use")));
        }
        self.commit_local(node, parent_id, name.to_string())
    }

    /// Move `name` under `new_parent`, keeping its name.
    pub fn move_node(&mut self, name: &str, new_parent: &str) -> Result<MoveOperation> {
        let node = self.resolve_node(name)?;
        let parent = self.resolve_parent(new_parent)?;
        if node == NodeId::ROOT {
            return Err(Error::ReservedNode(name.to_string()));
        }
        if self.store.is_descendant_or_self(parent, node) {
            return Err(Error::WouldCycle(name.to_string()));
        }
        if self.store.parent(node) == Some(parent) {
            return Err(Error::AlreadyChild {
                node: name.to_string(),
                parent: new_parent.to_string(),
            });
        }
        let current = self.current_name(node)?;
        self.commit_local(node, parent, current)
    }

    /// Rename in place: a move to the current parent carrying the new name.
    pub fn rename(&mut self, name: &str, new_name: &str) -> Result<MoveOperation> {
        validate_name(new_name)?;
        let node = self.resolve_node(name)?;
        if node == NodeId::ROOT {
            return Err(Error::ReservedNode(name.to_string()));
        }
        if self.store.lookup(new_name).is_some() {
            return Err(Error::NameExists(new_name.to_string()));
        }
        let parent = self.store.parent(node).ok_or_else(|| {
            Error::InvalidOperation(format!("{name} is not attached to the tree yet"))
        })?;
        self.commit_local(node, parent, new_name.to_string())
    }

    /// Soft-delete: move under Trash.
    pub fn remove(&mut self, name: &str) -> Result<MoveOperation> {
        let node = self.resolve_node(name)?;
        if node == NodeId::ROOT {
            return Err(Error::ReservedNode(name.to_string()));
        }
        if self.remove_policy == RemovePolicy::Strict && self.store.is_removed(node) {
            return Err(Error::AlreadyRemoved(name.to_string()));
        }
        let current = self.current_name(node)?;
        self.commit_local(node, NodeId::TRASH, current)
    }

    /// Drop every log entry at or below the causally stable timestamp.
    ///
    /// Never touches the tree. Returns the number of entries removed; always 0 while the
    /// replica set is undeclared.
    pub fn compact(&mut self) -> usize {
        let Some(stable) = self.timestamps.stable() else {
            return 0;
        };
        let removed = self.log.truncate_through(stable);
        self.stats.compacted += removed as u64;
        removed
    }

    pub fn stable_timestamp(&self) -> Option<Lamport> {
        self.timestamps.stable()
    }

    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    /// Next timestamp this replica would issue.
    pub fn lamport(&self) -> Lamport {
        self.clock.now()
    }

    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    pub fn timestamps(&self) -> &TimestampVector {
        &self.timestamps
    }

    pub fn stats(&self) -> ApplyStats {
        self.stats
    }

    pub fn remove_policy(&self) -> RemovePolicy {
        self.remove_policy
    }

    pub fn outbox(&self) -> &O {
        &self.outbox
    }

    pub fn outbox_mut(&mut self) -> &mut O {
        &mut self.outbox
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.store.parent(node)
    }

    /// Children of `node` in id order.
    pub fn children(&self, node: NodeId) -> Option<Vec<NodeId>> {
        self.store.children(node).map(|c| c.iter().copied().collect())
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.store.lookup(name)
    }

    pub fn is_removed(&self, node: NodeId) -> bool {
        self.store.is_removed(node)
    }

    pub fn snapshot(&self) -> Vec<NodeExport> {
        self.store.snapshot()
    }

    pub fn render(&self) -> String {
        self.store.render()
    }

    /// Validate invariants: sentinels present, parent/children consistent, no cycles, log
    /// sorted. Intended for tests and debugging.
    pub fn validate_invariants(&self) -> Result<()> {
        for sentinel in [NodeId::ROOT, NodeId::TRASH] {
            if !self.store.exists(sentinel) {
                return Err(Error::InconsistentState(format!("sentinel {sentinel} missing")));
            }
            if self.store.parent(sentinel).is_some() {
                return Err(Error::InconsistentState(format!("sentinel {sentinel} has a parent")));
            }
        }

        for node in self.store.nodes() {
            for child in &node.children {
                match self.store.get(*child) {
                    Some(state) if state.parent == Some(node.id) => {}
                    Some(_) => {
                        return Err(Error::InconsistentState("child parent mismatch".into()))
                    }
                    None => {
                        return Err(Error::InconsistentState(
                            "child not present in nodes".into(),
                        ))
                    }
                }
            }
            if let Some(parent) = node.parent {
                let listed = self
                    .store
                    .children(parent)
                    .is_some_and(|c| c.contains(&node.id));
                if !listed {
                    return Err(Error::InconsistentState("parent does not list child".into()));
                }
            }
            if self.has_cycle_from(node.id) {
                return Err(Error::InconsistentState("cycle detected".into()));
            }
        }

        if !self.log.is_sorted() {
            return Err(Error::InconsistentState("operation log out of order".into()));
        }
        Ok(())
    }

    fn has_cycle_from(&self, start: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut current = Some(start);
        while let Some(n) = current {
            if !visited.insert(n) {
                return true;
            }
            current = self.store.parent(n);
        }
        false
    }

    fn resolve_node(&self, name: &str) -> Result<NodeId> {
        self.store
            .lookup(name)
            .ok_or_else(|| Error::UnknownNode(name.to_string()))
    }

    fn resolve_parent(&self, name: &str) -> Result<NodeId> {
        self.store
            .lookup(name)
            .ok_or_else(|| Error::UnknownParent(name.to_string()))
    }

    fn current_name(&self, node: NodeId) -> Result<String> {
        self.store
            .name(node)
            .map(str::to_string)
            .ok_or_else(|| Error::UnknownNode(node.to_string()))
    }

    fn commit_local(&mut self, node: NodeId, parent: NodeId, name: String) -> Result<MoveOperation> {
        let op = MoveOperation::new(self.replica_id, self.clock.tick(), node, parent, name);
        self.apply(op.clone())?;
        Ok(op)
    }

    fn revert(store: &mut TreeStore, entry: &LogEntry) -> Result<()> {
        if entry.ignored {
            return Ok(());
        }
        ensure_present(store, entry.node)?;
        store.reparent(entry.node, entry.old_parent)?;
        store.set_name(entry.node, &entry.old_name)
    }

    fn reapply(store: &mut TreeStore, entry: &mut LogEntry) -> Result<()> {
        ensure_present(store, entry.node)?;
        entry.ignored = !store.exists(entry.new_parent)
            || store.is_descendant_or_self(entry.new_parent, entry.node);
        if entry.ignored {
            return Ok(());
        }

        let Some(node) = store.get(entry.node) else {
            return Err(Error::InconsistentState(format!("node {} vanished", entry.node)));
        };
        entry.old_parent = node.parent.unwrap_or(NodeId::NONE);
        entry.old_name = node.name.clone();
        store.reparent(entry.node, entry.new_parent)?;
        store.set_name(entry.node, &entry.new_name)
    }
}

fn ensure_present(store: &TreeStore, node: NodeId) -> Result<()> {
    debug_assert!(store.exists(node), "log entry references unknown node {node}");
    if store.exists(node) {
        Ok(())
    } else {
        Err(Error::InconsistentState(format!("log entry references unknown node {node}")))
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidOperation(format!(
            "node names must be non-empty and free of whitespace: {name:?}"
        )));
    }
    Ok(())
}
