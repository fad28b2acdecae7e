//! A tree replica wired to its peers.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use udrtree_core::{
    ApplyStats, LamportClock, MemoryOutbox, MoveOperation, NodeExport, NodeId, ReplicaId, TreeCrdt,
};

use crate::codec::encode_op;
use crate::compactor::Compactor;
use crate::config::ReplicaConfig;
use crate::error::Result;
use crate::link::PeerLink;
use crate::receiver;
use crate::transport::Transport;

pub type Engine = TreeCrdt<LamportClock, MemoryOutbox>;

/// The engine behind its single lock. Every read and write of the tree goes through it.
pub type SharedEngine = Arc<Mutex<Engine>>;

/// Owns the engine, the compaction timer and one transport per peer.
///
/// Local commands run on the engine under the lock, collect what the engine published, and
/// only enqueue it on the peers after the lock is released.
pub struct Replica {
    id: ReplicaId,
    engine: SharedEngine,
    peers: RwLock<Vec<Arc<dyn Transport>>>,
    receivers: Mutex<Vec<JoinHandle<()>>>,
    compactor: Compactor,
    queue_capacity: usize,
    /// Held from draining the outbox until every peer accepted the frames, so each peer sees
    /// local operations in timestamp order.
    send_order: tokio::sync::Mutex<()>,
}

impl Replica {
    /// Replica with no peers yet. Starts the compaction timer, so it needs a tokio runtime.
    ///
    /// Fails when the config does not declare the replica set.
    pub fn new(config: &ReplicaConfig) -> Result<Self> {
        config.validate()?;
        let id = config.replica();
        let engine = TreeCrdt::new(id, LamportClock::default(), MemoryOutbox::default())
            .with_replicas(config.replica_set())
            .with_remove_policy(config.remove_policy);
        let engine = Arc::new(Mutex::new(engine));
        let compactor = Compactor::spawn(engine.clone(), config.compaction_interval());
        info!(replica = %id, "replica started");

        Ok(Self {
            id,
            engine,
            peers: RwLock::new(Vec::new()),
            receivers: Mutex::new(Vec::new()),
            compactor,
            queue_capacity: config.queue_capacity,
            send_order: tokio::sync::Mutex::new(()),
        })
    }

    /// Dial the relay and use it as the only peer.
    pub async fn connect_relay(config: &ReplicaConfig) -> Result<Self> {
        config.validate()?;
        let stream = TcpStream::connect(&config.relay_addr).await?;
        stream.set_nodelay(true)?;
        let replica = Self::new(config)?;
        let (reader, writer) = stream.into_split();
        replica.add_peer(config.relay_addr.clone(), reader, writer);
        info!(replica = %replica.id, relay = %config.relay_addr, "connected to relay");
        Ok(replica)
    }

    /// Attach a peer reachable over a byte stream: outgoing frames go through a [`PeerLink`]
    /// on `writer`, incoming frames from `reader` are applied to the engine.
    pub fn add_peer<R, W>(&self, peer: impl Into<String>, reader: R, writer: W) -> Arc<PeerLink>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let link = Arc::new(PeerLink::spawn(peer, writer, self.queue_capacity));
        let task = tokio::spawn(receiver::run(reader, self.engine.clone(), link.clone()));
        self.receivers.lock().push(task);
        self.peers.write().push(link.clone());
        link
    }

    /// Attach an outgoing-only transport. Whoever owns its other end feeds remote operations
    /// in through [`Replica::apply_remote`].
    pub fn add_transport(&self, transport: Arc<dyn Transport>) {
        self.peers.write().push(transport);
    }

    pub fn id(&self) -> ReplicaId {
        self.id
    }

    pub async fn add(&self, name: &str, parent: &str) -> Result<MoveOperation> {
        self.local(|engine| engine.add(name, parent)).await
    }

    pub async fn move_node(&self, name: &str, new_parent: &str) -> Result<MoveOperation> {
        self.local(|engine| engine.move_node(name, new_parent)).await
    }

    pub async fn rename(&self, name: &str, new_name: &str) -> Result<MoveOperation> {
        self.local(|engine| engine.rename(name, new_name)).await
    }

    pub async fn remove(&self, name: &str) -> Result<MoveOperation> {
        self.local(|engine| engine.remove(name)).await
    }

    /// Apply an operation that arrived outside of the stream peers.
    pub fn apply_remote(&self, op: MoveOperation) -> Result<()> {
        self.engine.lock().apply(op)?;
        Ok(())
    }

    /// Resume delivery on every peer.
    pub fn connect(&self) {
        for peer in self.peers.read().iter() {
            peer.connect();
        }
    }

    /// Pause delivery on every peer. Local operations keep queueing.
    pub fn disconnect(&self) {
        for peer in self.peers.read().iter() {
            peer.disconnect();
        }
    }

    /// Stop compaction, flush and close every peer, and wait for the receivers to exit.
    pub async fn close(&self) -> Result<()> {
        self.compactor.shutdown().await;
        let peers = std::mem::take(&mut *self.peers.write());
        for peer in peers {
            peer.close().await?;
        }
        let receivers = std::mem::take(&mut *self.receivers.lock());
        for task in receivers {
            task.await?;
        }
        info!(replica = %self.id, "replica closed");
        Ok(())
    }

    pub fn render(&self) -> String {
        self.engine.lock().render()
    }

    pub fn snapshot(&self) -> Vec<NodeExport> {
        self.engine.lock().snapshot()
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.engine.lock().lookup(name)
    }

    pub fn stats(&self) -> ApplyStats {
        self.engine.lock().stats()
    }

    /// Run a compaction pass now instead of waiting for the timer.
    pub fn compact(&self) -> usize {
        self.engine.lock().compact()
    }

    /// Read access to the engine under its lock.
    pub fn with_engine<T>(&self, f: impl FnOnce(&Engine) -> T) -> T {
        f(&*self.engine.lock())
    }

    async fn local<F>(&self, f: F) -> Result<MoveOperation>
    where
        F: FnOnce(&mut Engine) -> udrtree_core::Result<MoveOperation>,
    {
        let _order = self.send_order.lock().await;
        let (op, outgoing) = {
            let mut engine = self.engine.lock();
            let op = f(&mut *engine)?;
            (op, engine.outbox_mut().drain())
        };
        debug!(
            replica = %self.id,
            node = %op.node,
            parent = %op.new_parent,
            timestamp = op.timestamp,
            "applied local operation"
        );

        let peers = self.peers.read().clone();
        for op in &outgoing {
            let frame = encode_op(op)?;
            for peer in &peers {
                peer.send(frame.clone()).await?;
            }
        }
        Ok(op)
    }
}
