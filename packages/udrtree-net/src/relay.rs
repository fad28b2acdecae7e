//! Star-topology relay: every frame a peer sends is forwarded to every other peer.
//!
//! The relay only reads frame boundaries so frames of different senders never interleave on
//! a shared connection. Payloads are never decoded.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, trace, warn};

use crate::codec::{read_frame, write_frame};
use crate::config::RelayConfig;
use crate::error::Result;

type ConnId = u64;

enum RelayEvent {
    Joined(ConnId, mpsc::UnboundedSender<Bytes>),
    Frame(ConnId, Bytes),
    Left(ConnId),
}

pub struct Relay {
    listener: TcpListener,
    config: RelayConfig,
}

impl Relay {
    pub async fn bind(config: RelayConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run on a background task until [`RelayHandle::shutdown`].
    pub fn spawn(self) -> Result<RelayHandle> {
        let addr = self.local_addr()?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (peers_tx, peers) = watch::channel(0);
        let task = tokio::spawn(self.run(shutdown_rx, peers_tx));
        Ok(RelayHandle {
            addr,
            shutdown,
            peers,
            task,
        })
    }

    /// Accept peers until `shutdown` flips. `peers` tracks how many are attached.
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
        peers: watch::Sender<usize>,
    ) -> Result<()> {
        let slots = Arc::new(Semaphore::new(self.config.max_connections));
        let (events_tx, events_rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let dispatcher = tokio::spawn(dispatch(events_rx, peers));
        let mut connections = JoinSet::new();
        let mut next_id: ConnId = 0;
        info!(addr = ?self.listener.local_addr().ok(), max = self.config.max_connections, "relay listening");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!(%err, "accept failed");
                            continue;
                        }
                    };
                    let Ok(permit) = slots.clone().try_acquire_owned() else {
                        warn!(%addr, max = self.config.max_connections, "relay full, refusing peer");
                        continue;
                    };
                    if let Err(err) = stream.set_nodelay(true) {
                        debug!(%addr, %err, "could not disable nagle");
                    }

                    next_id += 1;
                    let conn = next_id;
                    info!(conn, %addr, "peer joined");
                    let (reader, writer) = stream.into_split();
                    let (out_tx, out_rx) = mpsc::unbounded_channel();
                    if events_tx.send(RelayEvent::Joined(conn, out_tx)).await.is_err() {
                        break;
                    }
                    connections.spawn(forward_out(conn, writer, out_rx));
                    connections.spawn(read_in(conn, reader, events_tx.clone(), permit));
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("relay shutting down");
        connections.shutdown().await;
        drop(events_tx);
        dispatcher.await?;
        Ok(())
    }
}

pub struct RelayHandle {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    peers: watch::Receiver<usize>,
    task: JoinHandle<Result<()>>,
}

impl RelayHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn peer_count(&self) -> usize {
        *self.peers.borrow()
    }

    /// Wait until at least `n` peers are attached. Frames sent before a peer attaches never
    /// reach it.
    pub async fn wait_for_peers(&mut self, n: usize) {
        let _ = self.peers.wait_for(|count| *count >= n).await;
    }

    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.send_replace(true);
        self.task.await?
    }
}

/// Single owner of the connection table; forwards in arrival order.
///
/// Per-connection queues are unbounded so a peer that stops reading only grows its own
/// backlog and never stalls forwarding to the others.
async fn dispatch(mut events: mpsc::Receiver<RelayEvent>, count: watch::Sender<usize>) {
    let mut peers: BTreeMap<ConnId, mpsc::UnboundedSender<Bytes>> = BTreeMap::new();
    while let Some(event) = events.recv().await {
        match event {
            RelayEvent::Joined(conn, out) => {
                peers.insert(conn, out);
            }
            RelayEvent::Left(conn) => {
                peers.remove(&conn);
            }
            RelayEvent::Frame(from, frame) => {
                let mut gone = Vec::new();
                for (conn, out) in &peers {
                    if *conn == from {
                        continue;
                    }
                    if out.send(frame.clone()).is_err() {
                        gone.push(*conn);
                    }
                }
                for conn in gone {
                    peers.remove(&conn);
                }
                trace!(from, len = frame.len(), "forwarded frame");
            }
        }
        count.send_replace(peers.len());
    }
    debug!("dispatcher stopped");
}

async fn read_in(
    conn: ConnId,
    mut reader: OwnedReadHalf,
    events: mpsc::Sender<RelayEvent>,
    _slot: OwnedSemaphorePermit,
) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                if events.send(RelayEvent::Frame(conn, frame)).await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                info!(conn, "peer left");
                break;
            }
            Err(err) => {
                warn!(conn, %err, "dropping peer after read failure");
                break;
            }
        }
    }
    let _ = events.send(RelayEvent::Left(conn)).await;
}

async fn forward_out(
    conn: ConnId,
    mut writer: OwnedWriteHalf,
    mut frames: mpsc::UnboundedReceiver<Bytes>,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(err) = write_frame(&mut writer, &frame).await {
            warn!(conn, %err, "forward failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
