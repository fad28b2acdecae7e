use crate::ids::{Lamport, NodeId, ReplicaId};
use crate::ops::{cmp_op_key, MoveOperation};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A logged move together with the state it displaced, so it can be undone.
///
/// `old_parent`/`old_name` are refreshed every time the entry is (re)applied. An `ignored`
/// entry keeps its slot in the log but left the tree untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LogEntry {
    pub replica: ReplicaId,
    pub timestamp: Lamport,
    pub node: NodeId,
    pub new_parent: NodeId,
    pub new_name: String,
    pub old_parent: NodeId,
    pub old_name: String,
    pub ignored: bool,
}

impl LogEntry {
    pub fn from_op(op: &MoveOperation) -> Self {
        Self {
            replica: op.replica,
            timestamp: op.timestamp,
            node: op.node,
            new_parent: op.new_parent,
            new_name: op.new_name.clone(),
            old_parent: NodeId::NONE,
            old_name: String::new(),
            ignored: false,
        }
    }

    pub fn key(&self) -> (Lamport, ReplicaId) {
        (self.timestamp, self.replica)
    }

    /// Strictly earlier in `(timestamp, replica)` order.
    pub fn sorts_before(&self, other: &LogEntry) -> bool {
        cmp_op_key(self.timestamp, self.replica, other.timestamp, other.replica).is_lt()
    }

    pub fn to_op(&self) -> MoveOperation {
        MoveOperation::new(
            self.replica,
            self.timestamp,
            self.node,
            self.new_parent,
            self.new_name.clone(),
        )
    }
}

/// History of applied moves, ordered by `(timestamp, replica)`.
#[derive(Clone, Debug, Default)]
pub struct OperationLog {
    entries: Vec<LogEntry>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn first_timestamp(&self) -> Option<Lamport> {
        self.entries.first().map(|e| e.timestamp)
    }

    /// Append at the tail; returns the index of the new entry.
    pub(crate) fn push(&mut self, entry: LogEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Swap slots `i - 1` and `i`.
    pub(crate) fn swap_with_previous(&mut self, i: usize) {
        self.entries.swap(i - 1, i);
    }

    pub(crate) fn get(&self, i: usize) -> Option<&LogEntry> {
        self.entries.get(i)
    }

    pub(crate) fn get_mut(&mut self, i: usize) -> Option<&mut LogEntry> {
        self.entries.get_mut(i)
    }

    /// Sorted ascending by `(timestamp, replica)`. Equal keys are tolerated: re-applying an
    /// identical operation logs it a second time right after its twin.
    pub fn is_sorted(&self) -> bool {
        self.entries.windows(2).all(|w| !w[1].sorts_before(&w[0]))
    }

    /// Drop the sorted prefix of entries with `timestamp <= stable`; returns how many went.
    pub(crate) fn truncate_through(&mut self, stable: Lamport) -> usize {
        let cut = self.entries.partition_point(|e| e.timestamp <= stable);
        self.entries.drain(..cut);
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts: Lamport, replica: u64) -> LogEntry {
        LogEntry::from_op(&MoveOperation::new(
            ReplicaId(replica),
            ts,
            NodeId(ts as u128),
            NodeId::ROOT,
            "n",
        ))
    }

    #[test]
    fn truncate_cuts_only_the_stable_prefix() {
        let mut log = OperationLog::new();
        for (ts, r) in [(1, 1), (2, 2), (2, 3), (4, 1), (7, 2)] {
            log.push(entry(ts, r));
        }
        assert!(log.is_sorted());

        assert_eq!(log.truncate_through(2), 3);
        assert_eq!(log.first_timestamp(), Some(4));
        assert_eq!(log.truncate_through(0), 0);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn detects_unsorted_tail() {
        let mut log = OperationLog::new();
        log.push(entry(3, 1));
        log.push(entry(2, 9));
        assert!(!log.is_sorted());
        log.swap_with_previous(1);
        assert!(log.is_sorted());
    }
}
