use std::cmp::Ordering;

use crate::ids::{Lamport, NodeId, ReplicaId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The only mutation the tree knows about.
///
/// Add, move, rename and remove are all expressed as "place `node` under `new_parent` with
/// `new_name`". A remove is a move under [`NodeId::TRASH`]; a node's first appearance creates it.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MoveOperation {
    pub replica: ReplicaId,
    pub timestamp: Lamport,
    pub node: NodeId,
    pub new_parent: NodeId,
    pub new_name: String,
}

impl MoveOperation {
    pub fn new(
        replica: ReplicaId,
        timestamp: Lamport,
        node: NodeId,
        new_parent: NodeId,
        new_name: impl Into<String>,
    ) -> Self {
        Self {
            replica,
            timestamp,
            node,
            new_parent,
            new_name: new_name.into(),
        }
    }

    /// Move `node` under Trash, keeping its name.
    pub fn remove(
        replica: ReplicaId,
        timestamp: Lamport,
        node: NodeId,
        name: impl Into<String>,
    ) -> Self {
        Self::new(replica, timestamp, node, NodeId::TRASH, name)
    }

    /// Total-order key: timestamp first, replica id as the tie-breaker.
    pub fn key(&self) -> (Lamport, ReplicaId) {
        (self.timestamp, self.replica)
    }
}

/// Canonical ordering for operation keys used throughout the core.
pub fn cmp_op_key(
    a_timestamp: Lamport,
    a_replica: ReplicaId,
    b_timestamp: Lamport,
    b_replica: ReplicaId,
) -> Ordering {
    (a_timestamp, a_replica).cmp(&(b_timestamp, b_replica))
}

/// Canonical ordering for full operations.
pub fn cmp_ops(a: &MoveOperation, b: &MoveOperation) -> Ordering {
    cmp_op_key(a.timestamp, a.replica, b.timestamp, b.replica)
}
