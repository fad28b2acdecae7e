#![forbid(unsafe_code)]
//! Core of a move-operation tree CRDT.
//!
//! Every mutation of the shared namespace (add, move, rename, remove) is a single kind of
//! operation: "put node N under parent P with name S". Replicas apply operations in any order;
//! the engine keeps its log sorted by `(timestamp, replica)` and undoes/redoes the tail when an
//! older operation shows up, so every replica that saw the same operations ends with the same
//! tree. Networking lives elsewhere; this crate only needs an [`Outbox`] to hand local
//! operations to.

pub mod error;
pub mod frontier;
pub mod ids;
pub mod log;
pub mod ops;
pub mod store;
pub mod traits;
pub mod tree;

pub use error::{Error, Result};
pub use frontier::TimestampVector;
pub use ids::{Lamport, NodeId, ReplicaId};
pub use log::{LogEntry, OperationLog};
pub use ops::{cmp_op_key, cmp_ops, MoveOperation};
pub use store::{NodeExport, TreeNode, TreeStore, ROOT_NAME, TRASH_NAME};
pub use traits::{Clock, LamportClock, MemoryOutbox, NoopOutbox, Outbox};
pub use tree::{ApplyDelta, ApplyStats, RemovePolicy, TreeCrdt};
