use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use udrtree_core::{MoveOperation, NodeId, ReplicaId};
use udrtree_net::{decode_op, LinkState, Replica, ReplicaConfig, Transport};
use udrtree_test_support::mv;

fn config(id: u64) -> ReplicaConfig {
    ReplicaConfig {
        replica_id: id,
        replicas: vec![1, 2],
        ..ReplicaConfig::default()
    }
}

/// Wire `a` and `b` to each other over an in-memory stream.
fn pair(a: &Replica, b: &Replica) {
    let (left, right) = tokio::io::duplex(1 << 16);
    let (left_rd, left_wr) = tokio::io::split(left);
    let (right_rd, right_wr) = tokio::io::split(right);
    a.add_peer(format!("replica-{}", b.id()), left_rd, left_wr);
    b.add_peer(format!("replica-{}", a.id()), right_rd, right_wr);
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

#[tokio::test]
async fn local_operations_reach_the_peer() {
    let (a, b) = (Replica::new(&config(1)).unwrap(), Replica::new(&config(2)).unwrap());
    pair(&a, &b);

    a.add("docs", "root").await.unwrap();
    eventually(|| b.lookup("docs").is_some()).await;
    b.add("notes", "docs").await.unwrap();
    eventually(|| a.lookup("notes").is_some()).await;

    assert_eq!(a.snapshot(), b.snapshot());
    assert_eq!(a.render(), "root\n└── docs\n    └── notes\n");
    assert_eq!(a.stats().remote_ops, 1);

    a.close().await.unwrap();
    b.close().await.unwrap();
}

#[tokio::test]
async fn disconnected_replica_catches_up_after_reconnect() {
    let (a, b) = (Replica::new(&config(1)).unwrap(), Replica::new(&config(2)).unwrap());
    pair(&a, &b);

    a.disconnect();
    a.add("offline", "root").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(b.lookup("offline").is_none());

    a.connect();
    eventually(|| b.lookup("offline").is_some()).await;
    a.close().await.unwrap();
    b.close().await.unwrap();
}

#[tokio::test]
async fn concurrent_conflicting_moves_converge() {
    let (a, b) = (Replica::new(&config(1)).unwrap(), Replica::new(&config(2)).unwrap());
    pair(&a, &b);

    a.add("x", "root").await.unwrap();
    a.add("y", "root").await.unwrap();
    eventually(|| b.lookup("y").is_some()).await;

    a.disconnect();
    b.disconnect();
    a.move_node("x", "y").await.unwrap();
    b.move_node("y", "x").await.unwrap();
    a.connect();
    b.connect();

    eventually(|| a.stats().remote_ops == 1 && b.stats().remote_ops == 3).await;
    assert_eq!(a.snapshot(), b.snapshot());
    a.with_engine(|engine| engine.validate_invariants()).unwrap();

    let (x, y) = (a.lookup("x").unwrap(), a.lookup("y").unwrap());
    let under_root = [x, y]
        .iter()
        .filter(|n| a.with_engine(|e| e.parent(**n)) == Some(NodeId::ROOT))
        .count();
    assert_eq!(under_root, 1, "exactly one of the two moves wins");

    a.close().await.unwrap();
    b.close().await.unwrap();
}

#[tokio::test]
async fn close_delivers_operations_queued_while_disconnected() {
    let (a, b) = (Replica::new(&config(1)).unwrap(), Replica::new(&config(2)).unwrap());
    pair(&a, &b);

    a.disconnect();
    a.add("late", "root").await.unwrap();
    a.close().await.unwrap();

    eventually(|| b.lookup("late").is_some()).await;
    b.close().await.unwrap();
}

#[tokio::test]
async fn compaction_timer_trims_stable_entries() {
    let fast = |id| ReplicaConfig {
        compaction_interval_ms: 20,
        ..config(id)
    };
    let (a, b) = (Replica::new(&fast(1)).unwrap(), Replica::new(&fast(2)).unwrap());
    pair(&a, &b);

    a.add("first", "root").await.unwrap();
    eventually(|| b.lookup("first").is_some()).await;
    b.add("second", "root").await.unwrap();
    eventually(|| a.lookup("second").is_some()).await;

    eventually(|| a.stats().compacted >= 1).await;
    assert!(a.with_engine(|e| e.log().iter().all(|entry| entry.timestamp > 1)));
    assert!(a.lookup("first").is_some());

    a.close().await.unwrap();
    b.close().await.unwrap();
}

#[derive(Default)]
struct Recorder {
    frames: Mutex<Vec<Bytes>>,
}

#[async_trait]
impl Transport for Recorder {
    async fn send(&self, frame: Bytes) -> udrtree_net::Result<()> {
        tokio::task::yield_now().await;
        self.frames.lock().push(frame);
        Ok(())
    }

    fn connect(&self) {}

    fn disconnect(&self) {}

    async fn close(&self) -> udrtree_net::Result<()> {
        Ok(())
    }

    fn state(&self) -> LinkState {
        LinkState::Connected
    }
}

#[tokio::test]
async fn any_transport_can_carry_operations() {
    let replica = Replica::new(&config(1)).unwrap();
    let recorder = Arc::new(Recorder::default());
    replica.add_transport(recorder.clone());

    let op = replica.add("a", "root").await.unwrap();
    replica.apply_remote(mv(2, 10, 99, NodeId::ROOT, "remote")).unwrap();

    let frames = recorder.frames.lock().clone();
    assert_eq!(frames.len(), 1, "remote operations are not re-broadcast");
    let sent: MoveOperation = decode_op(&frames[0]).unwrap();
    assert_eq!(sent, op);
    assert_eq!(sent.replica, ReplicaId(1));
    assert_eq!(replica.lookup("remote"), Some(NodeId(99)));

    replica.close().await.unwrap();
}

#[tokio::test]
async fn rejected_commands_send_nothing() {
    let replica = Replica::new(&config(1)).unwrap();
    let recorder = Arc::new(Recorder::default());
    replica.add_transport(recorder.clone());

    assert!(replica.move_node("missing", "root").await.is_err());
    assert!(replica.remove("root").await.is_err());
    assert!(recorder.frames.lock().is_empty());
    replica.close().await.unwrap();
}

#[tokio::test]
async fn undecodable_frame_disconnects_the_peer() {
    let replica = Replica::new(&config(1)).unwrap();
    let (ours, theirs) = tokio::io::duplex(1 << 16);
    let (rd, wr) = tokio::io::split(ours);
    let link = replica.add_peer("garbage", rd, wr);

    let (_their_rd, mut their_wr) = tokio::io::split(theirs);
    udrtree_net::write_frame(&mut their_wr, &[0xff; 3]).await.unwrap();

    let mut state = link.subscribe();
    state
        .wait_for(|s| *s == LinkState::Disconnected)
        .await
        .unwrap();
    assert_eq!(replica.stats().remote_ops, 0);
    replica.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_local_operations_leave_in_timestamp_order() {
    let replica = Arc::new(Replica::new(&config(1)).unwrap());
    let recorder = Arc::new(Recorder::default());
    replica.add_transport(recorder.clone());

    let tasks: Vec<_> = (0..8)
        .map(|worker| {
            let replica = replica.clone();
            tokio::spawn(async move {
                for i in 0..25 {
                    replica.add(&format!("n{worker}-{i}"), "root").await.unwrap();
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let timestamps: Vec<_> = recorder
        .frames
        .lock()
        .iter()
        .map(|frame| decode_op(frame).unwrap().timestamp)
        .collect();
    assert_eq!(timestamps.len(), 200);
    assert!(
        timestamps.windows(2).all(|w| w[0] < w[1]),
        "frames left out of order: {timestamps:?}"
    );
    replica.close().await.unwrap();
}
