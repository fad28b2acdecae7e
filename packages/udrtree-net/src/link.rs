//! Queued, pausable sender to one peer.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::write_frame;
use crate::error::{NetError, Result};
use crate::transport::{LinkState, Transport};

pub const DEFAULT_QUEUE_CAPACITY: usize = 100_000;

pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// [`Transport`] over any byte stream.
///
/// A background task owns the writer and drains a bounded queue while the link is
/// `Connected`. Producers wait when the queue is full; frames are never discarded.
pub struct PeerLink {
    peer: String,
    queue: Mutex<Option<mpsc::Sender<Bytes>>>,
    state: Arc<watch::Sender<LinkState>>,
    writers: mpsc::UnboundedSender<BoxedWriter>,
    sender: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PeerLink {
    /// Start the sender task for `writer`. Must be called inside a tokio runtime.
    pub fn spawn<W>(peer: impl Into<String>, writer: W, capacity: usize) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let peer = peer.into();
        let (queue_tx, queue_rx) = mpsc::channel(capacity.max(1));
        let (writers_tx, writers_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(LinkState::Connected);
        let state = Arc::new(state);

        let task = tokio::spawn(
            SenderLoop {
                peer: peer.clone(),
                writer: Box::new(writer),
                queue: queue_rx,
                writers: writers_rx,
                state: state.clone(),
                retry: None,
            }
            .run(),
        );

        Self {
            peer,
            queue: Mutex::new(Some(queue_tx)),
            state,
            writers: writers_tx,
            sender: tokio::sync::Mutex::new(Some(task)),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Frames waiting to be written.
    pub fn queued(&self) -> usize {
        self.queue
            .lock()
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }

    /// Hand the sender a fresh stream after the previous one failed and resume delivery. A
    /// frame whose write failed goes out first.
    pub fn attach<W>(&self, writer: W) -> Result<()>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        if self.state() == LinkState::Closed {
            return Err(NetError::Closed);
        }
        self.writers
            .send(Box::new(writer))
            .map_err(|_| NetError::Closed)
    }

    pub(crate) fn mark_disconnected(&self) {
        transition(&self.state, LinkState::Connected, LinkState::Disconnected);
    }
}

#[async_trait]
impl Transport for PeerLink {
    async fn send(&self, frame: Bytes) -> Result<()> {
        let queue = self.queue.lock().clone().ok_or(NetError::Closed)?;
        queue.send(frame).await.map_err(|_| NetError::Closed)
    }

    fn connect(&self) {
        if transition(&self.state, LinkState::Disconnected, LinkState::Connected) {
            info!(peer = %self.peer, "link connected");
        }
    }

    fn disconnect(&self) {
        if transition(&self.state, LinkState::Connected, LinkState::Disconnected) {
            info!(peer = %self.peer, queued = self.queued(), "link disconnected");
        }
    }

    async fn close(&self) -> Result<()> {
        let previous = self.state.send_replace(LinkState::Closed);
        if previous != LinkState::Closed {
            debug!(peer = %self.peer, queued = self.queued(), "closing link");
        }
        // Dropping the last queue sender lets the task drain and exit.
        drop(self.queue.lock().take());
        let task = self.sender.lock().await.take();
        if let Some(task) = task {
            task.await?;
        }
        Ok(())
    }

    fn state(&self) -> LinkState {
        *self.state.borrow()
    }
}

fn transition(state: &watch::Sender<LinkState>, from: LinkState, to: LinkState) -> bool {
    state.send_if_modified(|current| {
        if *current == from {
            *current = to;
            true
        } else {
            false
        }
    })
}

enum Step {
    Frame(Bytes),
    Drained,
    StateChanged,
    Writer(BoxedWriter),
}

struct SenderLoop {
    peer: String,
    writer: BoxedWriter,
    queue: mpsc::Receiver<Bytes>,
    writers: mpsc::UnboundedReceiver<BoxedWriter>,
    state: Arc<watch::Sender<LinkState>>,
    retry: Option<Bytes>,
}

impl SenderLoop {
    async fn run(mut self) {
        let mut state = self.state.subscribe();
        loop {
            let current = *state.borrow_and_update();

            let step = if current == LinkState::Disconnected {
                tokio::select! {
                    _ = state.changed() => Step::StateChanged,
                    Some(writer) = self.writers.recv() => Step::Writer(writer),
                }
            } else if let Some(frame) = self.retry.take() {
                Step::Frame(frame)
            } else {
                tokio::select! {
                    frame = self.queue.recv() => match frame {
                        Some(frame) => Step::Frame(frame),
                        None => Step::Drained,
                    },
                    _ = state.changed(), if current == LinkState::Connected => Step::StateChanged,
                    Some(writer) = self.writers.recv() => Step::Writer(writer),
                }
            };

            match step {
                Step::Frame(frame) => {
                    if let Err(err) = write_frame(&mut self.writer, &frame).await {
                        warn!(peer = %self.peer, %err, "send failed, holding frame for retry");
                        self.retry = Some(frame);
                        if current == LinkState::Closed {
                            break;
                        }
                        transition(&self.state, LinkState::Connected, LinkState::Disconnected);
                    }
                }
                Step::Drained => break,
                Step::StateChanged => {}
                Step::Writer(writer) => {
                    debug!(peer = %self.peer, "writer re-attached");
                    self.writer = writer;
                    transition(&self.state, LinkState::Disconnected, LinkState::Connected);
                }
            }
        }

        let undelivered = usize::from(self.retry.is_some()) + self.queue.len();
        if undelivered > 0 {
            warn!(peer = %self.peer, undelivered, "link closed with frames still queued");
        }
        let _ = self.writer.shutdown().await;
        debug!(peer = %self.peer, "sender stopped");
    }
}
