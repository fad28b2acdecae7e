use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lamport timestamp used for ordering operations.
pub type Lamport = u64;

/// Unique identifier for a replica. Fixed width so it can double as the tie-breaker in
/// `(timestamp, replica)` ordering.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReplicaId(pub u64);

impl ReplicaId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a node in the tree: a 128-bit UUID stored as its integer value.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(pub u128);

impl NodeId {
    /// The all-zero UUID: "no parent" / "not applicable".
    pub const NONE: NodeId = NodeId(0);
    pub const ROOT: NodeId = NodeId(0x5568143b_b80b_452d_ba1b_f9d333a06e7a);
    pub const TRASH: NodeId = NodeId(0xcf0008e9_9845_465b_8c9b_fa4b31b7f3bd);

    /// Fresh random (v4) identifier for a node created by this replica.
    pub fn random() -> Self {
        Self(Uuid::new_v4().as_u128())
    }

    /// Root, Trash and the `NONE` sentinel can never be the subject of an operation.
    pub fn is_reserved(self) -> bool {
        self == Self::NONE || self == Self::ROOT || self == Self::TRASH
    }

    pub fn as_uuid(self) -> Uuid {
        Uuid::from_u128(self.0)
    }
}

impl From<Uuid> for NodeId {
    fn from(value: Uuid) -> Self {
        Self(value.as_u128())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_uuid().hyphenated().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_distinct_and_reserved() {
        assert_ne!(NodeId::ROOT, NodeId::TRASH);
        assert!(NodeId::ROOT.is_reserved());
        assert!(NodeId::TRASH.is_reserved());
        assert!(NodeId::NONE.is_reserved());
        assert!(!NodeId::random().is_reserved());
    }

    #[test]
    fn displays_as_hyphenated_uuid() {
        assert_eq!(
            NodeId::ROOT.to_string(),
            "5568143b-b80b-452d-ba1b-f9d333a06e7a"
        );
        assert_eq!(
            NodeId::NONE.to_string(),
            "00000000-0000-0000-0000-000000000000"
        );
    }
}
