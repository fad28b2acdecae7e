use udrtree_core::NodeId;
use udrtree_test_support::{mv, replay};

#[test]
fn late_operation_reverts_and_reapplies_the_tail() {
    let base = [mv(1, 1, 1, NodeId::ROOT, "a"), mv(1, 2, 2, NodeId::ROOT, "b")];
    let t3 = mv(1, 3, 1, NodeId(2), "a");
    let t4 = mv(2, 4, 2, NodeId(1), "b");
    let t5 = mv(2, 5, 2, NodeId::ROOT, "b2");

    let in_order = replay(&[base[0].clone(), base[1].clone(), t3.clone(), t4.clone(), t5.clone()]);

    let mut late = replay(&base);
    late.apply(t4).unwrap();
    late.apply(t5).unwrap();
    let delta = late.apply(t3).unwrap();

    assert_eq!(delta.reverted, 2);
    assert_eq!(delta.index, 2);
    assert!(!delta.ignored);
    late.validate_invariants().unwrap();
    assert_eq!(late.snapshot(), in_order.snapshot());

    // t3 put a under b, which makes t4 (b under a) a cycle.
    assert_eq!(late.parent(NodeId(1)), Some(NodeId(2)));
    assert_eq!(late.parent(NodeId(2)), Some(NodeId::ROOT));
    assert!(late.log().entries()[3].ignored);
    assert_eq!(late.lookup("b2"), Some(NodeId(2)));
}

#[test]
fn move_arriving_before_its_parent_is_created() {
    let child_first = mv(2, 2, 2, NodeId(1), "child");
    let parent_later = mv(1, 1, 1, NodeId::ROOT, "parent");

    let mut crdt = replay(&[child_first.clone()]);
    // Target parent unknown: entry kept, but ignored; the node waits detached.
    assert!(crdt.log().entries()[0].ignored);
    assert_eq!(crdt.parent(NodeId(2)), None);

    crdt.apply(parent_later.clone()).unwrap();
    crdt.validate_invariants().unwrap();
    assert_eq!(crdt.parent(NodeId(2)), Some(NodeId(1)));
    assert_eq!(crdt.snapshot(), replay(&[parent_later, child_first]).snapshot());
}

#[test]
fn move_applied_after_insert_when_delivered_out_of_order() {
    let move_op = mv(1, 3, 2, NodeId(1), "node");
    let parent_insert = mv(1, 1, 1, NodeId::ROOT, "parent");
    let node_insert = mv(1, 2, 2, NodeId::ROOT, "node");

    let crdt = replay(&[move_op, parent_insert, node_insert]);
    assert_eq!(crdt.parent(NodeId(2)), Some(NodeId(1)));
    assert_eq!(crdt.children(NodeId(1)).unwrap(), vec![NodeId(2)]);
    assert!(crdt.log().is_sorted());
}
