use std::time::Duration;

use tokio::net::TcpStream;
use udrtree_net::{read_frame, write_frame, Relay, RelayConfig, RelayHandle, Replica, ReplicaConfig};

async fn start_relay(max_connections: usize) -> RelayHandle {
    start_relay_with(RelayConfig {
        max_connections,
        ..RelayConfig::default()
    })
    .await
}

async fn start_relay_with(config: RelayConfig) -> RelayHandle {
    let relay = Relay::bind(RelayConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        ..config
    })
    .await
    .unwrap();
    relay.spawn().unwrap()
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
async fn replicas_converge_through_the_relay() {
    let mut relay = start_relay(10).await;
    let mut replicas = Vec::new();
    for id in 1..=3 {
        let config = ReplicaConfig {
            replica_id: id,
            replicas: vec![1, 2, 3],
            relay_addr: relay.local_addr().to_string(),
            ..ReplicaConfig::default()
        };
        replicas.push(Replica::connect_relay(&config).await.unwrap());
    }
    relay.wait_for_peers(3).await;

    replicas[0].add("projects", "root").await.unwrap();
    eventually(|| replicas.iter().all(|r| r.lookup("projects").is_some())).await;

    replicas[1].add("alpha", "projects").await.unwrap();
    replicas[2].add("beta", "root").await.unwrap();
    replicas[2].remove("beta").await.unwrap();
    replicas[0].rename("projects", "work").await.unwrap();

    eventually(|| {
        let first = replicas[0].snapshot();
        replicas[0].stats().remote_ops == 3 && replicas.iter().all(|r| r.snapshot() == first)
    })
    .await;
    assert_eq!(replicas[1].render(), "root\n└── work\n    └── alpha\n");

    for replica in &replicas {
        replica.close().await.unwrap();
    }
    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn frames_go_to_everyone_but_the_sender() {
    let mut relay = start_relay(2).await;
    let mut first = TcpStream::connect(relay.local_addr()).await.unwrap();
    let mut second = TcpStream::connect(relay.local_addr()).await.unwrap();
    relay.wait_for_peers(2).await;

    // Payloads are forwarded untouched, even ones that are not operations.
    write_frame(&mut first, b"opaque").await.unwrap();
    assert_eq!(read_frame(&mut second).await.unwrap().as_deref(), Some(&b"opaque"[..]));

    let echo = tokio::time::timeout(Duration::from_millis(100), read_frame(&mut first)).await;
    assert!(echo.is_err(), "sender received its own frame");

    // Full relay: the third peer is dropped right away.
    let mut third = TcpStream::connect(relay.local_addr()).await.unwrap();
    assert!(read_frame(&mut third).await.unwrap().is_none());
    assert_eq!(relay.peer_count(), 2);

    relay.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stalled_peer_does_not_hold_up_the_others() {
    const FRAMES: usize = 400;
    let mut relay = start_relay_with(RelayConfig {
        max_connections: 3,
        queue_capacity: 4,
        ..RelayConfig::default()
    })
    .await;
    let mut sender = TcpStream::connect(relay.local_addr()).await.unwrap();
    let mut reader = TcpStream::connect(relay.local_addr()).await.unwrap();
    // Never read from; its socket buffers fill up after a few frames.
    let _stalled = TcpStream::connect(relay.local_addr()).await.unwrap();
    relay.wait_for_peers(3).await;

    let writer = tokio::spawn(async move {
        let payload = vec![7u8; 64 * 1024];
        for _ in 0..FRAMES {
            write_frame(&mut sender, &payload).await.unwrap();
        }
        sender
    });

    let received = tokio::time::timeout(Duration::from_secs(20), async {
        let mut received = 0;
        while received < FRAMES {
            let frame = read_frame(&mut reader).await.unwrap().unwrap();
            assert_eq!(frame.len(), 64 * 1024);
            received += 1;
        }
        received
    })
    .await
    .expect("a stalled peer held up forwarding");
    assert_eq!(received, FRAMES);

    drop(writer.await.unwrap());
    relay.shutdown().await.unwrap();
}
