#[cfg(feature = "serde")]
#[test]
fn move_operation_json_roundtrips() {
    use udrtree_core::{MoveOperation, NodeId, ReplicaId};

    let op = MoveOperation::new(ReplicaId(3), 42, NodeId::random(), NodeId::ROOT, "docs");
    let json = serde_json::to_string(&op).expect("serialize MoveOperation");
    assert!(json.contains("\"new_name\":\"docs\""), "unexpected encoding: {json}");

    let roundtrip: MoveOperation = serde_json::from_str(&json).expect("deserialize MoveOperation");
    assert_eq!(roundtrip, op);
}

#[cfg(feature = "serde")]
#[test]
fn node_ids_serialize_as_plain_integers() {
    use udrtree_core::NodeId;

    let json = serde_json::to_string(&NodeId(7)).expect("serialize NodeId");
    assert_eq!(json, "7");
    let back: NodeId = serde_json::from_str("7").expect("deserialize NodeId");
    assert_eq!(back, NodeId(7));
}
