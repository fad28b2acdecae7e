//! Helpers shared by the udrtree test suites.

use udrtree_core::{
    Lamport, LamportClock, MoveOperation, NodeExport, NodeId, NoopOutbox, ReplicaId, TreeCrdt,
};

pub type TestTree = TreeCrdt<LamportClock, NoopOutbox>;

/// Replica that never replicates.
pub fn replica(id: u64) -> TestTree {
    TreeCrdt::new(ReplicaId(id), LamportClock::default(), NoopOutbox)
}

/// Shorthand for a move of `node` under `parent` named `name`.
pub fn mv(replica: u64, timestamp: Lamport, node: u128, parent: NodeId, name: &str) -> MoveOperation {
    MoveOperation::new(ReplicaId(replica), timestamp, NodeId(node), parent, name)
}

/// Apply `ops` in order on a fresh replica, checking invariants after every step.
pub fn replay(ops: &[MoveOperation]) -> TestTree {
    let mut crdt = replica(u64::MAX);
    for op in ops {
        crdt.apply(op.clone()).expect("apply");
        crdt.validate_invariants().expect("invariants");
    }
    crdt
}

/// All orderings of `items` (Heap's algorithm).
pub fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    fn heap_permute<T: Clone>(k: usize, items: &mut [T], res: &mut Vec<Vec<T>>) {
        if k <= 1 {
            res.push(items.to_vec());
            return;
        }
        heap_permute(k - 1, items, res);
        for i in 0..(k - 1) {
            if k % 2 == 0 {
                items.swap(i, k - 1);
            } else {
                items.swap(0, k - 1);
            }
            heap_permute(k - 1, items, res);
        }
    }

    let mut res = Vec::new();
    heap_permute(items.len(), &mut items.to_vec(), &mut res);
    res
}

/// Snapshot reached by replaying every ordering of `ops`; panics if any two orderings disagree.
pub fn converged_snapshot(ops: &[MoveOperation]) -> Vec<NodeExport> {
    let mut baseline: Option<Vec<NodeExport>> = None;
    for perm in permutations(ops) {
        let snapshot = replay(&perm).snapshot();
        match &baseline {
            Some(base) => assert_eq!(&snapshot, base, "diverged for ordering {perm:?}"),
            None => baseline = Some(snapshot),
        }
    }
    baseline.unwrap_or_default()
}
