//! Error types for replication.

use crate::codec::MAX_FRAME_LEN;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be (de)serialized.
    #[error("codec error: {0}")]
    Codec(#[from] postcard::Error),

    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(usize),

    /// The link was closed; nothing more can be queued on it.
    #[error("link closed")]
    Closed,

    /// A local command was rejected by the tree.
    #[error(transparent)]
    Engine(#[from] udrtree_core::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, NetError>;
