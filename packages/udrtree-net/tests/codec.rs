use tokio::io::AsyncWriteExt;
use udrtree_core::{MoveOperation, NodeId, ReplicaId};
use udrtree_net::{decode_op, encode_op, read_frame, write_frame, NetError, MAX_FRAME_LEN};

#[tokio::test]
async fn frames_keep_their_boundaries() {
    let (mut client, mut server) = tokio::io::duplex(1024);
    write_frame(&mut client, b"first").await.unwrap();
    write_frame(&mut client, b"").await.unwrap();
    write_frame(&mut client, b"third").await.unwrap();
    drop(client);

    assert_eq!(read_frame(&mut server).await.unwrap().as_deref(), Some(&b"first"[..]));
    assert_eq!(read_frame(&mut server).await.unwrap().as_deref(), Some(&b""[..]));
    assert_eq!(read_frame(&mut server).await.unwrap().as_deref(), Some(&b"third"[..]));
    assert!(read_frame(&mut server).await.unwrap().is_none());
}

#[tokio::test]
async fn oversized_length_prefix_is_rejected() {
    let (mut client, mut server) = tokio::io::duplex(64);
    client
        .write_all(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes())
        .await
        .unwrap();

    let err = read_frame(&mut server).await.unwrap_err();
    assert!(matches!(err, NetError::FrameTooLarge(len) if len == MAX_FRAME_LEN + 1));
}

#[tokio::test]
async fn oversized_payload_is_not_written() {
    let (mut client, _server) = tokio::io::duplex(64);
    let payload = vec![0u8; MAX_FRAME_LEN + 1];
    assert!(matches!(
        write_frame(&mut client, &payload).await,
        Err(NetError::FrameTooLarge(_))
    ));
}

#[test]
fn operations_survive_the_wire() {
    let op = MoveOperation::new(ReplicaId(2), 17, NodeId::random(), NodeId::TRASH, "gone");
    let bytes = encode_op(&op).unwrap();
    assert_eq!(decode_op(&bytes).unwrap(), op);

    assert!(matches!(decode_op(&bytes[..3]), Err(NetError::Codec(_))));
}
