use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Lifecycle of a link to one peer. `Closed` is final.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
    Closed,
}

/// Outgoing side of a connection to one peer.
///
/// Frames handed to `send` are queued and delivered in order while the link is connected.
/// Disconnecting pauses delivery without dropping anything; `close` flushes what is queued
/// and releases the underlying stream.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, frame: Bytes) -> Result<()>;

    fn connect(&self);

    fn disconnect(&self);

    async fn close(&self) -> Result<()>;

    fn state(&self) -> LinkState;
}
