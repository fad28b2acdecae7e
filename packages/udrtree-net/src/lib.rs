#![forbid(unsafe_code)]
//! Replication for udrtree replicas.
//!
//! Operations travel as postcard payloads inside length-prefixed frames. Each peer gets a
//! [`PeerLink`] (queued, pausable sender) and a receiver task that feeds the engine; a
//! [`Replica`] ties them to one engine and its compaction timer. The [`Relay`] is the hub of a
//! star topology and forwards frames between peers without decoding them.

pub mod codec;
pub mod compactor;
pub mod config;
pub mod error;
pub mod link;
mod receiver;
pub mod relay;
pub mod replica;
pub mod shell;
pub mod transport;

pub use codec::{decode_op, encode_op, read_frame, write_frame, MAX_FRAME_LEN};
pub use compactor::{Compactor, DEFAULT_COMPACTION_INTERVAL};
pub use config::{RelayConfig, ReplicaConfig};
pub use error::{NetError, Result};
pub use link::{BoxedWriter, PeerLink, DEFAULT_QUEUE_CAPACITY};
pub use relay::{Relay, RelayHandle};
pub use replica::{Engine, Replica, SharedEngine};
pub use shell::{Command, Outcome, ParseError, HELP};
pub use transport::{LinkState, Transport};
