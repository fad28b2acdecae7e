use std::collections::BTreeMap;

use crate::ids::{Lamport, ReplicaId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Highest operation timestamp observed from each replica.
///
/// Its minimum is the causally stable point: every replica has already issued something
/// later, so nothing at or below it can still arrive and force a revert. That only holds once
/// the whole replica set is known; until then [`TimestampVector::stable`] is `None`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimestampVector {
    entries: BTreeMap<ReplicaId, Lamport>,
    declared: bool,
}

impl TimestampVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a zero slot for every member of the replica set, so compaction waits until
    /// each of them has been heard from.
    pub fn with_replicas(replicas: impl IntoIterator<Item = ReplicaId>) -> Self {
        let entries: BTreeMap<_, _> = replicas.into_iter().map(|r| (r, 0)).collect();
        Self {
            declared: !entries.is_empty(),
            entries,
        }
    }

    pub fn observe(&mut self, replica: ReplicaId, timestamp: Lamport) {
        let slot = self.entries.entry(replica).or_default();
        *slot = (*slot).max(timestamp);
    }

    pub fn merge(&mut self, other: &TimestampVector) {
        self.declared |= other.declared;
        for (replica, timestamp) in &other.entries {
            self.observe(*replica, *timestamp);
        }
    }

    /// Highest timestamp seen from `replica`, or 0.
    pub fn get(&self, replica: ReplicaId) -> Lamport {
        self.entries.get(&replica).copied().unwrap_or(0)
    }

    /// `min` over all slots; `None` until a replica set was declared. A replica nobody has
    /// heard from yet has no lazily added slot, so without the declared set its operations
    /// could still land below the minimum.
    pub fn stable(&self) -> Option<Lamport> {
        if !self.declared {
            return None;
        }
        self.entries.values().copied().min()
    }

    /// Whether the full replica set is known.
    pub fn is_declared(&self) -> bool {
        self.declared
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (ReplicaId, Lamport)> + '_ {
        self.entries.iter().map(|(r, t)| (*r, *t))
    }
}
